//! Operator identity resolution.
//!
//! The player must never run as root, so provisioning needs to know which
//! human account invoked `sudo`. Resolution order:
//!
//! 1. `--user` on the command line
//! 2. `SUDO_USER`, set by sudo
//! 3. the login-session owner, as reported by `logname`

use std::path::PathBuf;

use nix::unistd::User;

use crate::context::Identity;
use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, Runner};

/// Env variable sudo sets to the invoking account.
pub const SUDO_USER_ENV: &str = "SUDO_USER";

/// Raw identity hints gathered from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct IdentityHints {
    pub explicit: Option<String>,
    pub sudo_user: Option<String>,
}

impl IdentityHints {
    /// Hints from a `--user` flag plus the process environment.
    pub fn from_env(explicit: Option<String>) -> Self {
        Self {
            explicit,
            sudo_user: std::env::var(SUDO_USER_ENV).ok(),
        }
    }
}

/// Account database lookup.
pub trait Accounts {
    fn lookup(&self, name: &str) -> Result<Option<Identity>>;
}

/// The host's passwd database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccounts;

impl Accounts for SystemAccounts {
    fn lookup(&self, name: &str) -> Result<Option<Identity>> {
        let user = User::from_name(name).map_err(|errno| {
            ProvisionError::Identity(format!("looking up '{}': {}", name, errno))
        })?;
        Ok(user.map(|u| Identity {
            name: u.name,
            uid: u.uid.as_raw(),
            gid: u.gid.as_raw(),
            home: PathBuf::from(u.dir),
        }))
    }
}

/// Pick the operator account name from the hints, falling back to `logname`.
pub async fn operator_name<R: Runner>(hints: &IdentityHints, runner: &R) -> Result<String> {
    let hinted = [&hints.explicit, &hints.sudo_user]
        .into_iter()
        .flatten()
        .map(|name| name.trim())
        .find(|name| !name.is_empty());

    if let Some(name) = hinted {
        return Ok(name.to_string());
    }

    let output = runner
        .run(&Cmd::new("logname").allow_fail())
        .await
        .map_err(|e| ProvisionError::Identity(format!("cannot determine session owner: {}", e)))?;
    let name = output.stdout.trim();
    if !output.success() || name.is_empty() {
        return Err(ProvisionError::Identity(
            "no --user given, SUDO_USER is unset and the login session has no owner".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Resolve and validate the operator account.
///
/// Fails if the name is root, unknown, or maps to uid 0.
pub async fn resolve_identity<R: Runner, A: Accounts>(
    hints: &IdentityHints,
    runner: &R,
    accounts: &A,
) -> Result<Identity> {
    let name = operator_name(hints, runner).await?;
    if name == "root" {
        return Err(ProvisionError::Identity(
            "resolved to root; run via sudo from a regular account or pass --user".to_string(),
        ));
    }

    let identity = accounts
        .lookup(&name)?
        .ok_or_else(|| ProvisionError::Identity(format!("no such user '{}'", name)))?;

    if identity.uid == 0 {
        return Err(ProvisionError::Identity(format!(
            "'{}' has uid 0; the player must not run privileged",
            name
        )));
    }

    tracing::info!(user = %identity.name, uid = identity.uid, "resolved operator");
    Ok(identity)
}
