//! Preflight: privilege gate, operator identity, and host status.
//!
//! The gate functions here run before any mutation. Nothing is created,
//! installed or written until [`check_privilege`] and
//! [`resolve_context`] have both succeeded.
//!
//! # Status report
//!
//! ```rust,ignore
//! use lossless_provision::preflight::PreflightChecker;
//!
//! let report = PreflightChecker::new(&ctx, &paths, current_euid()).run_all();
//! report.print_summary();
//! ```

mod artifacts;
mod host_tools;
pub mod identity;

pub use artifacts::ArtifactStatus;
pub use host_tools::check_host_tools;
pub use identity::{resolve_identity, Accounts, IdentityHints, SystemAccounts};

use std::path::Path;

use crate::config::SystemPaths;
use crate::context::InstallationContext;
use crate::error::{ProvisionError, Result};
use crate::process::Runner;

/// Effective uid of this process.
pub fn current_euid() -> u32 {
    nix::unistd::geteuid().as_raw()
}

/// Fail unless running as root.
pub fn check_privilege(euid: u32) -> Result<()> {
    if euid == 0 {
        Ok(())
    } else {
        Err(ProvisionError::Privilege { euid })
    }
}

/// Resolve the operator and derive the install layout.
pub async fn resolve_context<R: Runner, A: Accounts>(
    hints: &IdentityHints,
    install_dir: Option<&Path>,
    runner: &R,
    accounts: &A,
) -> Result<InstallationContext> {
    let identity = resolve_identity(hints, runner, accounts).await?;
    Ok(InstallationContext::new(identity, install_dir))
}

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Host readiness plus the state of provisioned artifacts.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
    pub artifacts: ArtifactStatus,
}

impl PreflightReport {
    /// Check if all preflight checks passed.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Get all failing checks.
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn print_summary(&self) {
        println!("=== Host Checks ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        println!("=== Provisioned Artifacts ===\n");
        self.artifacts.print();

        println!();
        if self.is_ok() {
            println!("All host checks passed ({}/{})", self.passed_count(), self.checks.len());
        } else {
            println!(
                "Host checks failed: {} of {} passed",
                self.passed_count(),
                self.checks.len()
            );
        }
    }
}

/// Read-only inspection of the host and an installation.
pub struct PreflightChecker<'a> {
    ctx: &'a InstallationContext,
    paths: &'a SystemPaths,
    euid: u32,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(ctx: &'a InstallationContext, paths: &'a SystemPaths, euid: u32) -> Self {
        Self { ctx, paths, euid }
    }

    pub fn run_all(&self) -> PreflightReport {
        let mut checks = vec![self.check_root()];
        checks.extend(check_host_tools());

        PreflightReport {
            checks,
            artifacts: ArtifactStatus::inspect(self.ctx, self.paths),
        }
    }

    fn check_root(&self) -> CheckResult {
        match check_privilege(self.euid) {
            Ok(()) => CheckResult::pass("Privilege", "running as root"),
            Err(e) => CheckResult::fail(
                "Privilege",
                e.to_string(),
                "install and audio need root; status works without it",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::identity::testing::FakeAccounts;
    use super::*;
    use crate::context::Identity;
    use crate::process::testing::RecordingRunner;
    use std::path::PathBuf;

    #[test]
    fn test_root_passes_privilege_gate() {
        assert!(check_privilege(0).is_ok());
    }

    #[test]
    fn test_non_root_is_privilege_error() {
        assert!(matches!(
            check_privilege(1000),
            Err(ProvisionError::Privilege { euid: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_resolve_context_with_install_dir() {
        let pi = Identity {
            name: "pi".into(),
            uid: 1000,
            gid: 1000,
            home: PathBuf::from("/home/pi"),
        };
        let hints = IdentityHints {
            explicit: Some("pi".into()),
            sudo_user: None,
        };
        let ctx = resolve_context(
            &hints,
            Some(Path::new("/srv/player")),
            &RecordingRunner::new(),
            &FakeAccounts::with(pi),
        )
        .await
        .unwrap();
        assert_eq!(ctx.root, Path::new("/srv/player"));
    }

    #[test]
    fn test_report_is_ok() {
        let mut report = PreflightReport::default();
        assert!(report.is_ok());

        report.checks.push(CheckResult::pass("a", "ok"));
        assert!(report.is_ok());

        report.checks.push(CheckResult::fail("b", "bad", "fix"));
        assert!(!report.is_ok());
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_checker_flags_non_root() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = InstallationContext::new(Identity::current_for_testing(scratch.path()), None);
        let paths = SystemPaths::under(scratch.path());

        let report = PreflightChecker::new(&ctx, &paths, 1000).run_all();

        assert!(!report.checks[0].passed);
        assert!(!report.artifacts.env_file_complete);
    }
}
