//! ALSA routing, mixer levels and self-test.
//!
//! Runs only as its own entry point (`lossless-provision audio`), usually
//! after the reboot that activates the DAC overlay, and again whenever the
//! audio path needs repair. The routing file is replaced wholesale every time.

use std::time::Duration;

use crate::config::SystemPaths;
use crate::error::{CommandError, ProvisionError, Result};
use crate::process::{Cmd, Runner};
use crate::reconcile::{self, Change};

/// Upper bound on the speaker test.
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(15);

const ASOUND_MODE: u32 = 0o644;

/// Fixed hardware binding and mixer levels for the DAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRouteConfig {
    pub card: u32,
    pub device: u32,
    /// `(control, level)` pairs passed to `amixer sset`.
    pub mixer: [(&'static str, &'static str); 2],
}

impl Default for AudioRouteConfig {
    fn default() -> Self {
        Self {
            card: 0,
            device: 0,
            mixer: [("Digital", "100%"), ("Analogue", "100%")],
        }
    }
}

impl AudioRouteConfig {
    /// Contents of `asound.conf`.
    pub fn render(&self) -> String {
        format!(
            "# Managed by lossless-provision; replaced on every run.\n\
             pcm.!default {{\n    type hw\n    card {card}\n    device {device}\n}}\n\
             \n\
             ctl.!default {{\n    type hw\n    card {card}\n}}\n",
            card = self.card,
            device = self.device,
        )
    }
}

/// Result of the speaker test. A failed test does not fail the run.
#[derive(Debug)]
pub enum SelfTest {
    Passed,
    Failed(CommandError),
}

/// Rewrite routing, set mixer levels, play a test tone, print hints.
pub async fn configure_audio<R: Runner>(
    runner: &R,
    paths: &SystemPaths,
    route: &AudioRouteConfig,
) -> Result<SelfTest> {
    let rendered = route.render();
    reconcile::apply(&paths.asound_conf, Some(ASOUND_MODE), |_| {
        Ok(Change::Replace(rendered))
    })?;
    println!(
        "  Default PCM bound to hw:{},{} in {}",
        route.card,
        route.device,
        paths.asound_conf.display()
    );

    let card = route.card.to_string();
    for (control, level) in route.mixer {
        runner
            .run(&Cmd::new("amixer").args(["-c", card.as_str(), "sset", control, level]))
            .await
            .map_err(|source| ProvisionError::Audio {
                stage: "mixer level",
                source,
            })?;
        println!("  {} set to {}", control, level);
    }

    println!("  Playing a two-channel test tone...");
    let test = Cmd::new("speaker-test")
        .args(["-D", "default", "-c", "2", "-t", "sine", "-l", "1"])
        .timeout(SELF_TEST_TIMEOUT);
    let result = match runner.run(&test).await {
        Ok(_) => {
            println!("  [OK] Self-test completed");
            SelfTest::Passed
        }
        Err(e) => {
            tracing::warn!(error = %e, "speaker self-test failed");
            println!("  [WARN] Self-test failed: {}", e);
            SelfTest::Failed(e)
        }
    };

    print_diagnostics(route);
    Ok(result)
}

/// Commands worth running by hand when audio misbehaves.
pub fn diagnostic_hints(route: &AudioRouteConfig) -> Vec<String> {
    vec![
        "aplay -l".to_string(),
        format!("amixer -c {} scontrols", route.card),
        "cat /proc/asound/cards".to_string(),
        "journalctl -u lossless-player -f".to_string(),
    ]
}

fn print_diagnostics(route: &AudioRouteConfig) {
    println!();
    println!("Diagnostics:");
    for hint in diagnostic_hints(route) {
        println!("  {}", hint);
    }
}
