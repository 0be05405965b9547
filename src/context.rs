//! Installation context shared by every provisioning step.
//!
//! Built once by preflight after the operator account is resolved, then
//! passed by reference into each step. Nothing in here changes after
//! construction.

use std::path::{Path, PathBuf};

use crate::config::{INSTALL_DIR_NAME, MOUNT_DIR_NAME, UNIT_NAME};

/// The non-privileged account the player service runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl Identity {
    /// Execution context for running a command as this account in `dir`.
    pub fn exec_in(&self, dir: impl Into<PathBuf>) -> ExecContext {
        ExecContext {
            name: self.name.clone(),
            uid: self.uid,
            gid: self.gid,
            home: self.home.clone(),
            working_dir: dir.into(),
        }
    }

    /// The account running this process (for tests against scratch dirs).
    #[cfg(test)]
    pub fn current_for_testing(home: &Path) -> Self {
        Self {
            name: "operator".to_string(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            home: home.to_path_buf(),
        }
    }
}

/// Who runs a command and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub working_dir: PathBuf,
}

/// Resolved paths for one installation.
#[derive(Debug, Clone)]
pub struct InstallationContext {
    /// Operator account that owns the install tree.
    pub identity: Identity,
    /// Install root, e.g. `/home/pi/lossless_player`.
    pub root: PathBuf,
    /// Mount point for the remote music share.
    pub mount_point: PathBuf,
    /// Player application sources.
    pub src_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Staging copy of the generated unit.
    pub unit_staging_dir: PathBuf,
    /// Python virtual environment.
    pub venv_dir: PathBuf,
}

impl InstallationContext {
    /// Derive the layout from the operator's home, or from an explicit root.
    pub fn new(identity: Identity, root_override: Option<&Path>) -> Self {
        let root = root_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| identity.home.join(INSTALL_DIR_NAME));
        let mount_point = identity.home.join(MOUNT_DIR_NAME);

        Self {
            src_dir: root.join("src"),
            log_dir: root.join("logs"),
            unit_staging_dir: root.join("systemd"),
            venv_dir: root.join("venv"),
            mount_point,
            root,
            identity,
        }
    }

    /// Interpreter inside the virtual environment.
    pub fn python(&self) -> PathBuf {
        self.venv_dir.join("bin").join("python")
    }

    pub fn pip(&self) -> PathBuf {
        self.venv_dir.join("bin").join("pip")
    }

    /// Entry point of the external player application.
    pub fn entry_point(&self) -> PathBuf {
        self.src_dir.join("main.py")
    }

    /// Environment file read by the player at startup.
    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn staged_unit(&self) -> PathBuf {
        self.unit_staging_dir.join(UNIT_NAME)
    }

    /// Run a command as the operator from the install root.
    pub fn as_operator(&self) -> ExecContext {
        self.identity.exec_in(&self.root)
    }
}
