//! The `install` and `audio` entry points.
//!
//! `install` is a straight line of steps. Each step either succeeds or
//! stops the run; the failing step is named in the returned
//! [`PipelineError`]. Nothing is rolled back.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{PackageSet, PlayerSettings, SystemPaths, PYTHON_LIBRARIES, UNIT_NAME};
use crate::context::InstallationContext;
use crate::error::ProvisionError;
use crate::input::OperatorInput;
use crate::preflight::{self, Accounts, IdentityHints};
use crate::process::Runner;
use crate::step::audio::{configure_audio, AudioRouteConfig, SelfTest};
use crate::step::lifecycle::{activate_service, Supervisor};
use crate::step::{envfile, filesystem, overlay, packages, runtime, unit, Step};
use crate::Timer;

/// A provisioning run stopped at `step`.
#[derive(Debug, Error)]
#[error("step '{step}' failed")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: ProvisionError,
}

fn at(step: Step) -> impl FnOnce(ProvisionError) -> PipelineError {
    move |source| PipelineError { step, source }
}

/// Host-facing handles: who we are, how commands run, where system files live.
pub struct Host<R, A> {
    pub euid: u32,
    pub runner: R,
    pub accounts: A,
    pub paths: SystemPaths,
}

/// Operator choices for `install`.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub identity: IdentityHints,
    pub install_dir: Option<PathBuf>,
    pub settings: PlayerSettings,
    pub packages: PackageSet,
}

#[derive(Debug)]
pub struct InstallReport {
    pub context: InstallationContext,
    /// Boot config was changed; the DAC is unusable until reboot.
    pub reboot_required: bool,
    pub token_missing: bool,
    /// A reboot was requested and `systemctl reboot` succeeded.
    pub rebooting: bool,
}

fn begin(step: Step) -> Timer {
    let position = Step::INSTALL
        .iter()
        .position(|s| *s == step)
        .map(|i| i + 1)
        .unwrap_or(0);
    println!("\n[{}/{}] {}...", position, Step::INSTALL.len(), step);
    Timer::start(step.label())
}

/// Provision the appliance end to end.
pub async fn install<R, A, I>(
    host: &Host<R, A>,
    opts: &InstallOptions,
    input: &mut I,
) -> Result<InstallReport, PipelineError>
where
    R: Runner,
    A: Accounts,
    I: OperatorInput,
{
    println!("=== Lossless Player Provisioning ===");

    let t = begin(Step::Preflight);
    preflight::check_privilege(host.euid).map_err(at(Step::Preflight))?;
    let ctx = preflight::resolve_context(
        &opts.identity,
        opts.install_dir.as_deref(),
        &host.runner,
        &host.accounts,
    )
    .await
    .map_err(at(Step::Preflight))?;
    println!("  Operator: {} (uid {})", ctx.identity.name, ctx.identity.uid);
    println!("  Install root: {}", ctx.root.display());
    t.finish();

    let t = begin(Step::Packages);
    packages::install_packages(&host.runner, &opts.packages)
        .await
        .map_err(at(Step::Packages))?;
    t.finish();

    let t = begin(Step::Filesystem);
    filesystem::provision_dirs(&ctx).map_err(at(Step::Filesystem))?;
    t.finish();

    let t = begin(Step::Runtime);
    runtime::build_runtime(&host.runner, &ctx, PYTHON_LIBRARIES)
        .await
        .map_err(at(Step::Runtime))?;
    t.finish();

    let t = begin(Step::Overlay);
    let overlay_outcome =
        overlay::enable_overlay(&host.paths.boot_config).map_err(at(Step::Overlay))?;
    t.finish();

    let t = begin(Step::Secrets);
    let secrets = input.secrets().map_err(at(Step::Secrets))?;
    let token_missing = !secrets.has_token();
    if token_missing {
        tracing::warn!("no bot token supplied; the player will not start its bot");
        println!(
            "  [WARN] No bot token given. Set TELEGRAM_BOT_TOKEN in {} before using the bot.",
            ctx.env_file().display()
        );
    }
    t.finish();

    let t = begin(Step::EnvFile);
    envfile::write_env_file(&ctx, &opts.settings, &secrets).map_err(at(Step::EnvFile))?;
    t.finish();

    let t = begin(Step::Unit);
    unit::install_unit(&ctx, &host.paths).map_err(at(Step::Unit))?;
    t.finish();

    let t = begin(Step::Lifecycle);
    activate_service(&host.runner, UNIT_NAME)
        .await
        .map_err(at(Step::Lifecycle))?;
    t.finish();

    println!("\n=== Provisioning Complete ===");
    println!("  Logs: journalctl -u {} -f", UNIT_NAME);
    println!("  Audio: sudo lossless-provision audio");

    let reboot_required = overlay_outcome.reboot_required();
    let mut rebooting = false;
    if reboot_required {
        println!("\nThe DAC overlay was added; a reboot is needed before audio works.");
        if input.confirm_reboot().map_err(at(Step::Reboot))? {
            Supervisor::new(&host.runner)
                .reboot()
                .await
                .map_err(at(Step::Reboot))?;
            rebooting = true;
        } else {
            println!("  Reboot later with: sudo reboot");
        }
    }

    Ok(InstallReport {
        context: ctx,
        reboot_required,
        token_missing,
        rebooting,
    })
}

/// Bind ALSA to the DAC, set mixer levels and run the self-test.
pub async fn audio<R: Runner, A>(
    host: &Host<R, A>,
    route: &AudioRouteConfig,
) -> Result<SelfTest, PipelineError> {
    println!("=== Audio Configuration ===");
    preflight::check_privilege(host.euid).map_err(at(Step::Audio))?;

    let t = Timer::start(Step::Audio.label());
    let result = configure_audio(&host.runner, &host.paths, route)
        .await
        .map_err(at(Step::Audio))?;
    t.finish();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use crate::input::PresetInput;
    use crate::preflight::identity::testing::FakeAccounts;
    use crate::process::testing::RecordingRunner;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// A non-root operator this process can chown to.
    fn operator(home: &Path) -> Identity {
        let mut identity = Identity::current_for_testing(home);
        identity.name = "pi".to_string();
        if identity.uid == 0 {
            identity.uid = 1000;
            identity.gid = 1000;
        }
        identity
    }

    struct Fixture {
        scratch: TempDir,
        host: Host<RecordingRunner, FakeAccounts>,
        opts: InstallOptions,
    }

    impl Fixture {
        fn new(euid: u32, runner: RecordingRunner) -> Self {
            let scratch = tempdir().unwrap();
            let paths = SystemPaths::under(&scratch.path().join("sys"));
            fs::create_dir_all(paths.boot_config.parent().unwrap()).unwrap();
            fs::write(&paths.boot_config, "arm_64bit=1\n").unwrap();

            let identity = operator(&scratch.path().join("home"));
            let opts = InstallOptions {
                identity: IdentityHints {
                    explicit: Some(identity.name.clone()),
                    sudo_user: None,
                },
                install_dir: Some(scratch.path().join("player")),
                ..InstallOptions::default()
            };
            let host = Host {
                euid,
                runner,
                accounts: FakeAccounts::with(identity),
                paths,
            };
            Self { scratch, host, opts }
        }

        fn install_root(&self) -> PathBuf {
            self.scratch.path().join("player")
        }
    }

    fn answers(reboot: bool) -> PresetInput {
        let mut values = HashMap::new();
        values.insert("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string());
        values.insert("MUSIC_SERVER_USERNAME".to_string(), "alice".to_string());
        PresetInput::new(values, reboot)
    }

    #[tokio::test]
    async fn test_non_root_runs_nothing() {
        let fx = Fixture::new(1000, RecordingRunner::new());

        let err = install(&fx.host, &fx.opts, &mut answers(false))
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Preflight);
        assert!(matches!(err.source, ProvisionError::Privilege { euid: 1000 }));
        assert!(fx.host.runner.lines().is_empty());
        assert!(!fx.install_root().exists());
    }

    #[tokio::test]
    async fn test_root_operator_aborts_before_directories() {
        let mut fx = Fixture::new(0, RecordingRunner::new());
        fx.opts.identity.explicit = Some("root".to_string());

        let err = install(&fx.host, &fx.opts, &mut answers(false))
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Preflight);
        assert!(matches!(err.source, ProvisionError::Identity(_)));
        assert!(fx.host.runner.lines().is_empty());
        assert!(!fx.install_root().exists());
    }

    #[tokio::test]
    async fn test_happy_path_command_sequence() {
        let fx = Fixture::new(0, RecordingRunner::new());

        let report = install(&fx.host, &fx.opts, &mut answers(false))
            .await
            .unwrap();

        let root = fx.install_root();
        let pip = format!("{}/venv/bin/pip", root.display());
        let lines = fx.host.runner.lines();
        assert_eq!(lines[0], "apt-get update");
        assert!(lines[1].starts_with("apt-get install -y python3 "));
        assert_eq!(lines[2], format!("python3 -m venv {}/venv", root.display()));
        assert_eq!(lines[3], format!("{} install --upgrade pip", pip));
        assert!(lines[4].starts_with(&format!("{} install python-telegram-bot", pip)));
        assert_eq!(
            &lines[5..],
            [
                "systemctl daemon-reload",
                "systemctl enable lossless-player.service",
                "systemctl start lossless-player.service",
            ]
        );

        assert!(report.reboot_required);
        assert!(!report.token_missing);
        assert!(!report.rebooting);

        let env = fs::read_to_string(root.join(".env")).unwrap();
        assert!(env.contains("TELEGRAM_BOT_TOKEN=123:abc\n"));
        assert!(env.contains("MUSIC_SERVER_USERNAME=alice\n"));
        assert!(fx.host.paths.unit_file().exists());
        assert!(root.join("src").is_dir());
        assert!(fx.scratch.path().join("home/music_server").is_dir());
    }

    #[tokio::test]
    async fn test_stops_at_failing_package_install() {
        let fx = Fixture::new(0, RecordingRunner::new().fail_on("apt-get install"));

        let err = install(&fx.host, &fx.opts, &mut answers(false))
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Packages);
        assert!(matches!(err.source, ProvisionError::Dependency { .. }));
        assert_eq!(fx.host.runner.lines().len(), 2);
        assert!(!fx.install_root().exists());
        assert!(!fx.host.paths.unit_file().exists());
    }

    #[tokio::test]
    async fn test_reboot_when_confirmed() {
        let fx = Fixture::new(0, RecordingRunner::new());

        let report = install(&fx.host, &fx.opts, &mut answers(true))
            .await
            .unwrap();

        assert!(report.rebooting);
        assert_eq!(
            fx.host.runner.lines().last().map(String::as_str),
            Some("systemctl reboot")
        );
    }

    #[tokio::test]
    async fn test_no_reboot_prompt_when_overlay_present() {
        let fx = Fixture::new(0, RecordingRunner::new());
        fs::write(
            &fx.host.paths.boot_config,
            "arm_64bit=1\ndtoverlay=hifiberry-dacplus\n",
        )
        .unwrap();

        let report = install(&fx.host, &fx.opts, &mut answers(true))
            .await
            .unwrap();

        assert!(!report.reboot_required);
        assert!(!report.rebooting);
        assert!(!fx
            .host
            .runner
            .lines()
            .contains(&"systemctl reboot".to_string()));
    }

    #[tokio::test]
    async fn test_empty_token_is_degraded_not_fatal() {
        let fx = Fixture::new(0, RecordingRunner::new());

        let report = install(&fx.host, &fx.opts, &mut PresetInput::default())
            .await
            .unwrap();

        assert!(report.token_missing);
        let env = fs::read_to_string(fx.install_root().join(".env")).unwrap();
        assert!(env.contains("TELEGRAM_BOT_TOKEN=\n"));
    }

    #[tokio::test]
    async fn test_audio_requires_root() {
        let fx = Fixture::new(1000, RecordingRunner::new());

        let err = audio(&fx.host, &AudioRouteConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Audio);
        assert!(fx.host.runner.lines().is_empty());
        assert!(!fx.host.paths.asound_conf.exists());
    }
}
