//! Python virtual environment for the player.
//!
//! Everything here runs as the operator. A venv created by root would
//! leave root-owned files that later `pip` runs as the operator cannot
//! touch.

use crate::context::InstallationContext;
use crate::error::{CommandError, ProvisionError, Result};
use crate::process::{Cmd, Runner};

fn build_error(stage: &'static str) -> impl FnOnce(CommandError) -> ProvisionError {
    move |source| ProvisionError::EnvironmentBuild { stage, source }
}

/// Create the venv (if missing), upgrade pip, install `libraries`.
pub async fn build_runtime<R: Runner>(
    runner: &R,
    ctx: &InstallationContext,
    libraries: &[&str],
) -> Result<()> {
    let operator = ctx.as_operator();
    let pip = ctx.pip().to_string_lossy().into_owned();

    if ctx.python().exists() {
        println!("  [SKIP] Virtual environment exists at {}", ctx.venv_dir.display());
    } else {
        println!("  Creating virtual environment at {}", ctx.venv_dir.display());
        runner
            .run(
                &Cmd::new("python3")
                    .args(["-m", "venv"])
                    .arg_path(&ctx.venv_dir)
                    .exec_as(operator.clone()),
            )
            .await
            .map_err(build_error("creation"))?;
    }

    runner
        .run(
            &Cmd::new(pip.as_str())
                .args(["install", "--upgrade", "pip"])
                .exec_as(operator.clone()),
        )
        .await
        .map_err(build_error("pip upgrade"))?;

    println!("  Installing libraries: {}", libraries.join(" "));
    runner
        .run(
            &Cmd::new(pip.as_str())
                .arg("install")
                .args(libraries.iter().copied())
                .exec_as(operator),
        )
        .await
        .map_err(build_error("library install"))?;

    Ok(())
}
