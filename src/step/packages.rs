//! OS package installation via apt.

use crate::config::PackageSet;
use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, Runner};

fn apt(subcommand: &str) -> Cmd {
    Cmd::new("apt-get")
        .arg(subcommand)
        .env("DEBIAN_FRONTEND", "noninteractive")
}

/// Refresh the package index, then install `packages` in one batch.
///
/// Either failure aborts; a half-installed dependency set is never
/// considered usable.
pub async fn install_packages<R: Runner>(runner: &R, packages: &PackageSet) -> Result<()> {
    println!("  Refreshing package index...");
    runner
        .run(&apt("update"))
        .await
        .map_err(|source| ProvisionError::Dependency {
            stage: "index refresh",
            source,
        })?;

    if packages.is_empty() {
        return Ok(());
    }

    println!("  Installing: {}", packages.names().join(" "));
    runner
        .run(&apt("install").arg("-y").args(packages.names().iter().copied()))
        .await
        .map_err(|source| ProvisionError::Dependency {
            stage: "install",
            source,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;

    #[tokio::test]
    async fn test_update_then_single_install() {
        let runner = RecordingRunner::new();
        let packages = PackageSet::new(&["vlc", "alsa-utils"]);

        install_packages(&runner, &packages).await.unwrap();

        assert_eq!(
            runner.lines(),
            vec!["apt-get update", "apt-get install -y vlc alsa-utils"]
        );
    }

    #[tokio::test]
    async fn test_index_failure_skips_install() {
        let runner = RecordingRunner::new().fail_on("apt-get update");

        let err = install_packages(&runner, &PackageSet::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Dependency {
                stage: "index refresh",
                ..
            }
        ));
        assert_eq!(runner.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_install_failure_is_dependency_error() {
        let runner = RecordingRunner::new().fail_on("apt-get install");

        let err = install_packages(&runner, &PackageSet::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Dependency {
                stage: "install",
                ..
            }
        ));
    }
}
