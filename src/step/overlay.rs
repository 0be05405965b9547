//! DAC overlay in the Raspberry Pi boot configuration.
//!
//! The change is append-only and guarded by a presence check: existing
//! lines are never rewritten, so the directive appears at most once no
//! matter how often provisioning runs. Duplicates added by hand are not
//! cleaned up.

use std::io;
use std::path::Path;

use crate::config::{AUDIO_PARAM, OVERLAY_DIRECTIVE, OVERLAY_HEADER};
use crate::error::{ProvisionError, Result};
use crate::reconcile::{self, Change};

/// Result of [`enable_overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    AlreadyPresent,
    Appended,
}

impl OverlayOutcome {
    /// The overlay only takes effect after a reboot.
    pub fn reboot_required(self) -> bool {
        self == OverlayOutcome::Appended
    }
}

/// True if an active (uncommented) overlay line is present.
pub fn overlay_present(boot_config: &str) -> bool {
    boot_config
        .lines()
        .any(|line| line.trim() == OVERLAY_DIRECTIVE)
}

/// Text appended to a config that lacks the overlay.
pub fn overlay_block(current: &str) -> String {
    let mut block = String::new();
    if !current.is_empty() && !current.ends_with('\n') {
        block.push('\n');
    }
    block.push('\n');
    block.push_str(OVERLAY_HEADER);
    block.push('\n');
    block.push_str(OVERLAY_DIRECTIVE);
    block.push('\n');
    block.push_str(AUDIO_PARAM);
    block.push('\n');
    block
}

/// Append the overlay block to `boot_config` unless it is already there.
pub fn enable_overlay(boot_config: &Path) -> Result<OverlayOutcome> {
    let outcome = reconcile::apply(boot_config, None, |current| match current {
        None => Err(ProvisionError::io(
            boot_config,
            io::Error::new(io::ErrorKind::NotFound, "boot configuration not found or is a symlink"),
        )),
        Some(content) if overlay_present(content) => Ok(Change::Keep),
        Some(content) => Ok(Change::Append(overlay_block(content))),
    })?;

    if outcome.changed() {
        println!("  Enabled {} in {}", OVERLAY_DIRECTIVE, boot_config.display());
        println!("  NOTE: a reboot is required before the DAC is available");
        Ok(OverlayOutcome::Appended)
    } else {
        println!("  [SKIP] {} already present in {}", OVERLAY_DIRECTIVE, boot_config.display());
        Ok(OverlayOutcome::AlreadyPresent)
    }
}
