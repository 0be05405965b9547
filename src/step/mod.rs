//! Provisioning steps.
//!
//! Each submodule implements one step of the install pipeline (or the
//! standalone audio configurator). Steps take the installation context
//! and the system file handles explicitly; none of them reach for global
//! paths or ambient identity.
//!
//! | Step | Module | Mutates |
//! |------|--------|---------|
//! | Packages | [`packages`] | apt state |
//! | Filesystem | [`filesystem`] | install tree, mount point |
//! | Runtime | [`runtime`] | `venv/` |
//! | Overlay | [`overlay`] | boot `config.txt` (append only) |
//! | Env file | [`envfile`] | `<root>/.env` |
//! | Unit | [`unit`] | `/etc/systemd/system/lossless-player.service` |
//! | Lifecycle | [`lifecycle`] | systemd state |
//! | Audio | [`audio`] | `/etc/asound.conf`, mixer |

pub mod audio;
pub mod envfile;
pub mod filesystem;
pub mod lifecycle;
pub mod overlay;
pub mod packages;
pub mod runtime;
pub mod unit;

use std::fmt;

/// Named stage of a run, used to report where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Preflight,
    Packages,
    Filesystem,
    Runtime,
    Overlay,
    Secrets,
    EnvFile,
    Unit,
    Lifecycle,
    Reboot,
    Audio,
}

impl Step {
    /// Bannered steps of `install`, in execution order. The reboot prompt
    /// that may follow is not counted.
    pub const INSTALL: [Step; 9] = [
        Step::Preflight,
        Step::Packages,
        Step::Filesystem,
        Step::Runtime,
        Step::Overlay,
        Step::Secrets,
        Step::EnvFile,
        Step::Unit,
        Step::Lifecycle,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Step::Preflight => "preflight",
            Step::Packages => "packages",
            Step::Filesystem => "filesystem",
            Step::Runtime => "runtime environment",
            Step::Overlay => "DAC overlay",
            Step::Secrets => "secrets",
            Step::EnvFile => "environment file",
            Step::Unit => "service unit",
            Step::Lifecycle => "service lifecycle",
            Step::Reboot => "reboot",
            Step::Audio => "audio",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
