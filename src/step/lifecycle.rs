//! systemd lifecycle commands.
//!
//! Success means systemctl exited 0. Whether the player actually comes up
//! afterwards is not checked here; see `journalctl -u` for that.

use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, Runner};

/// Thin wrapper over `systemctl`.
pub struct Supervisor<'a, R> {
    runner: &'a R,
}

impl<'a, R: Runner> Supervisor<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, action: &'static str, unit: Option<&str>) -> Result<()> {
        let mut cmd = Cmd::new("systemctl").arg(action);
        if let Some(unit) = unit {
            cmd = cmd.arg(unit);
        }
        self.runner
            .run(&cmd)
            .await
            .map(|_| ())
            .map_err(|source| ProvisionError::ServiceLifecycle { action, source })
    }

    /// Re-read unit files.
    pub async fn daemon_reload(&self) -> Result<()> {
        self.systemctl("daemon-reload", None).await
    }

    pub async fn enable(&self, unit: &str) -> Result<()> {
        self.systemctl("enable", Some(unit)).await
    }

    pub async fn start(&self, unit: &str) -> Result<()> {
        self.systemctl("start", Some(unit)).await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.systemctl("reboot", None).await
    }
}

/// Reload, enable at boot, start now.
pub async fn activate_service<R: Runner>(runner: &R, unit: &str) -> Result<()> {
    let supervisor = Supervisor::new(runner);

    supervisor.daemon_reload().await?;
    supervisor.enable(unit).await?;
    println!("  Enabled {}", unit);
    supervisor.start(unit).await?;
    println!("  Started {}", unit);

    Ok(())
}
