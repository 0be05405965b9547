//! Host tool validation.
//!
//! Checks that the external tools provisioning shells out to are installed.

use super::CheckResult;
use crate::process::which;

/// Required host tools with their install suggestions.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("apt-get", "Install OS packages", "use a Debian-based image (Raspberry Pi OS)"),
    ("systemctl", "Manage the player service", "use a systemd-based image"),
    ("python3", "Create the virtual environment", "sudo apt-get install python3 python3-venv"),
    ("amixer", "Set mixer levels", "sudo apt-get install alsa-utils"),
    ("aplay", "List audio devices", "sudo apt-get install alsa-utils"),
    ("speaker-test", "Audio self-test", "sudo apt-get install alsa-utils"),
];

/// Check that all required host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, purpose, install)| check_tool(tool, purpose, install))
        .collect()
}

fn check_tool(tool: &str, purpose: &str, install_hint: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(
            format!("{} tool", tool),
            format!("Found at {} ({})", path.display(), purpose),
        ),
        None => CheckResult::fail(
            format!("{} tool", tool),
            format!("Not found (needed for: {})", purpose),
            install_hint,
        ),
    }
}
