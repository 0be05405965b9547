//! Lossless player provisioning CLI
//!
//! Turns a fresh Raspberry Pi OS install into a lossless audio player
//! appliance with a HiFiBerry DAC+.
//!
//! # Usage
//!
//! ```bash
//! # Full install (prompts for bot token and share credentials)
//! sudo lossless-provision install
//!
//! # Unattended install, answers from a KEY=value file
//! sudo lossless-provision install --answers answers.env --reboot
//!
//! # Re-bind ALSA to the DAC and play a test tone
//! sudo lossless-provision audio
//!
//! # Show host readiness and what is already provisioned
//! lossless-provision status
//!
//! # Print the systemd unit that install would write
//! lossless-provision unit --user pi
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lossless_provision::config::{
    PackageSet, PlayerSettings, SystemPaths, DEFAULT_SERVER_IP, DEFAULT_SHARE, DEFAULT_VOLUME,
};
use lossless_provision::input::{OperatorInput, PresetInput, Prompt};
use lossless_provision::pipeline::{self, Host, InstallOptions};
use lossless_provision::preflight::{self, IdentityHints, PreflightChecker, SystemAccounts};
use lossless_provision::process::SystemRunner;
use lossless_provision::step::audio::{AudioRouteConfig, SelfTest};
use lossless_provision::step::unit::ServiceUnitSpec;

#[derive(Parser)]
#[command(name = "lossless-provision")]
#[command(author, version, about = "Lossless audio player provisioning", long_about = None)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Account the player runs as (default: SUDO_USER, then the login owner)
    #[arg(long)]
    user: Option<String>,

    /// Install root (default: ~<user>/lossless_player)
    #[arg(long)]
    install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision everything and start the player service
    Install {
        #[command(flatten)]
        target: Target,

        /// Music server address
        #[arg(long, default_value = DEFAULT_SERVER_IP)]
        server_ip: String,

        /// CIFS share name on the music server
        #[arg(long, default_value = DEFAULT_SHARE)]
        share: String,

        /// Initial playback volume (0-100)
        #[arg(long, default_value_t = DEFAULT_VOLUME, value_parser = clap::value_parser!(u8).range(0..=100))]
        volume: u8,

        /// Take secrets from the environment instead of prompting
        #[arg(long, conflicts_with = "answers")]
        non_interactive: bool,

        /// Take secrets from a KEY=value file instead of prompting
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Reboot without asking if the boot config changed
        #[arg(long)]
        reboot: bool,
    },

    /// Configure ALSA routing and mixer, then run a speaker test
    Audio,

    /// Show host readiness and provisioned artifacts
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Print the systemd unit for an installation
    Unit {
        #[command(flatten)]
        target: Target,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Install {
            target,
            server_ip,
            share,
            volume,
            non_interactive,
            answers,
            reboot,
        } => {
            let opts = InstallOptions {
                identity: IdentityHints::from_env(target.user),
                install_dir: target.install_dir,
                settings: PlayerSettings {
                    server_ip,
                    share,
                    volume,
                },
                packages: PackageSet::default(),
            };
            cmd_install(opts, non_interactive, answers, reboot).await
        }
        Commands::Audio => cmd_audio().await,
        Commands::Status { target } => cmd_status(target).await,
        Commands::Unit { target } => cmd_unit(target).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
        .to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn system_host() -> Host<SystemRunner, SystemAccounts> {
    Host {
        euid: preflight::current_euid(),
        runner: SystemRunner,
        accounts: SystemAccounts,
        paths: SystemPaths::detect(),
    }
}

async fn cmd_install(
    opts: InstallOptions,
    non_interactive: bool,
    answers: Option<PathBuf>,
    reboot: bool,
) -> Result<()> {
    let host = system_host();

    if let Some(path) = answers {
        let mut input = PresetInput::from_file(&path, reboot)
            .with_context(|| format!("reading answers from {}", path.display()))?;
        run_install(&host, &opts, &mut input).await
    } else if non_interactive {
        run_install(&host, &opts, &mut PresetInput::from_env(reboot)).await
    } else {
        run_install(&host, &opts, &mut Prompt::stdio()).await
    }
}

async fn run_install<I: OperatorInput>(
    host: &Host<SystemRunner, SystemAccounts>,
    opts: &InstallOptions,
    input: &mut I,
) -> Result<()> {
    let report = pipeline::install(host, opts, input).await?;

    if report.token_missing {
        println!(
            "\nNote: the bot stays offline until TELEGRAM_BOT_TOKEN is set in {}",
            report.context.env_file().display()
        );
    }
    if report.rebooting {
        println!("\nRebooting...");
    }
    Ok(())
}

async fn cmd_audio() -> Result<()> {
    let host = system_host();
    match pipeline::audio(&host, &AudioRouteConfig::default()).await? {
        SelfTest::Passed => println!("\n=== Audio Configured ==="),
        SelfTest::Failed(_) => {
            println!("\n=== Audio Configured (self-test failed) ===");
            println!("  Check the DAC is seated and the overlay is active, then re-run.");
        }
    }
    Ok(())
}

async fn cmd_status(target: Target) -> Result<()> {
    let host = system_host();
    let hints = IdentityHints::from_env(target.user);
    let ctx = preflight::resolve_context(
        &hints,
        target.install_dir.as_deref(),
        &host.runner,
        &host.accounts,
    )
    .await?;

    println!("Lossless Player Status");
    println!("======================");
    println!();
    println!("Installation:");
    println!("  Operator:     {} (uid {})", ctx.identity.name, ctx.identity.uid);
    println!("  Install root: {}", ctx.root.display());
    println!("  Mount point:  {}", ctx.mount_point.display());
    println!("  Boot config:  {}", host.paths.boot_config.display());
    println!();

    PreflightChecker::new(&ctx, &host.paths, host.euid)
        .run_all()
        .print_summary();
    Ok(())
}

async fn cmd_unit(target: Target) -> Result<()> {
    let hints = IdentityHints::from_env(target.user);
    let ctx = preflight::resolve_context(
        &hints,
        target.install_dir.as_deref(),
        &SystemRunner,
        &SystemAccounts,
    )
    .await?;

    print!("{}", ServiceUnitSpec::for_installation(&ctx).render());
    Ok(())
}
