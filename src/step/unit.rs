//! systemd unit for the player.
//!
//! The unit is rendered from the installation context and always fully
//! overwrites what is on disk. A staging copy is kept under the install
//! root for reference.

use std::path::PathBuf;

use crate::config::{SystemPaths, RESTART_SEC, SYSLOG_IDENTIFIER, UNIT_DESCRIPTION};
use crate::context::InstallationContext;
use crate::error::Result;
use crate::reconcile::{self, Change, Outcome};
use crate::step::filesystem::set_owner;

/// World-readable, root-writable.
pub const UNIT_FILE_MODE: u32 = 0o644;

/// Everything the rendered unit depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnitSpec {
    pub description: String,
    pub user: String,
    pub working_dir: PathBuf,
    pub exec_start: String,
    pub restart_sec: u32,
    pub syslog_identifier: String,
}

impl ServiceUnitSpec {
    pub fn for_installation(ctx: &InstallationContext) -> Self {
        Self {
            description: UNIT_DESCRIPTION.to_string(),
            user: ctx.identity.name.clone(),
            working_dir: ctx.root.clone(),
            exec_start: format!("{} {}", ctx.python().display(), ctx.entry_point().display()),
            restart_sec: RESTART_SEC,
            syslog_identifier: SYSLOG_IDENTIFIER.to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network-online.target sound.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             User={user}\n\
             WorkingDirectory={working_dir}\n\
             ExecStart={exec_start}\n\
             Restart=always\n\
             RestartSec={restart_sec}\n\
             StandardOutput=syslog\n\
             StandardError=syslog\n\
             SyslogIdentifier={ident}\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description,
            user = self.user,
            working_dir = self.working_dir.display(),
            exec_start = self.exec_start,
            restart_sec = self.restart_sec,
            ident = self.syslog_identifier,
        )
    }
}

/// Write the staging copy and the system unit.
///
/// Returns what happened to the system unit.
pub fn install_unit(ctx: &InstallationContext, paths: &SystemPaths) -> Result<Outcome> {
    let unit = ServiceUnitSpec::for_installation(ctx).render();

    let staged = ctx.staged_unit();
    reconcile::apply(&staged, Some(UNIT_FILE_MODE), |_| Ok(Change::Replace(unit.clone())))?;
    set_owner(&staged, &ctx.identity)?;

    let target = paths.unit_file();
    let outcome = reconcile::apply(&target, Some(UNIT_FILE_MODE), |_| Ok(Change::Replace(unit)))?;
    match outcome {
        Outcome::Unchanged => println!("  [SKIP] {} is up to date", target.display()),
        _ => println!("  Wrote {}", target.display()),
    }
    Ok(outcome)
}
