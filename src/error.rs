//! Error taxonomy for provisioning.
//!
//! Every step returns [`ProvisionError`]. There is no retry and no
//! rollback: the first error ends the run, and whatever the failing step
//! had already applied stays on disk.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A command that could not be run, or ran and failed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {}{}", status_text(.status), stderr_text(.stderr))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("'{command}' timed out after {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_text(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Errors raised by provisioning steps.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Not running as root.
    #[error("must be run as root (effective uid is {euid}); re-run with sudo")]
    Privilege { euid: u32 },

    /// The operator account could not be resolved, or resolved to root.
    #[error("cannot resolve the operator account: {0}")]
    Identity(String),

    /// Package index refresh or package install failed.
    #[error("package {stage} failed")]
    Dependency {
        stage: &'static str,
        #[source]
        source: CommandError,
    },

    /// Virtual environment creation or library install failed.
    #[error("runtime environment {stage} failed")]
    EnvironmentBuild {
        stage: &'static str,
        #[source]
        source: CommandError,
    },

    /// systemctl reload/enable/start failed.
    #[error("systemctl {action} failed")]
    ServiceLifecycle {
        action: &'static str,
        #[source]
        source: CommandError,
    },

    /// Mixer configuration failed.
    #[error("audio {stage} failed")]
    Audio {
        stage: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("{}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading operator input failed.
    #[error("reading operator input")]
    Input(#[source] io::Error),
}

impl ProvisionError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Shorthand used throughout the library.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
