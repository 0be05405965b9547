//! Provisioning for a headless lossless audio player appliance.
//!
//! Installs OS packages, builds the player's Python environment, enables
//! the DAC overlay, writes the player's environment file and systemd unit,
//! starts the service, and configures the ALSA audio path.

pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod reconcile;
pub mod step;

use std::time::Instant;

/// Simple timer for step phases.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: &str) -> Self {
        Self {
            label: label.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            println!("  [{}: {:.1}m]", self.label, secs / 60.0);
        } else {
            println!("  [{}: {:.1}s]", self.label, secs);
        }
    }
}
