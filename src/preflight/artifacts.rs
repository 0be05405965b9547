//! State of previously provisioned artifacts.

use std::fs;

use crate::config::SystemPaths;
use crate::context::InstallationContext;
use crate::step::audio::AudioRouteConfig;
use crate::step::envfile;
use crate::step::overlay::overlay_present;
use crate::step::unit::ServiceUnitSpec;

/// What a previous `install`/`audio` run left behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub overlay_enabled: bool,
    pub venv_present: bool,
    /// Every env key exactly once.
    pub env_file_complete: bool,
    pub token_set: bool,
    pub unit_installed: bool,
    /// Installed unit matches what would be generated now.
    pub unit_current: bool,
    pub audio_routed: bool,
}

impl ArtifactStatus {
    pub fn inspect(ctx: &InstallationContext, paths: &SystemPaths) -> Self {
        let read = |path: &std::path::Path| fs::read_to_string(path).ok();

        let env = read(&ctx.env_file());
        let env_file_complete = env
            .as_deref()
            .map(|c| envfile::key_counts(c).iter().all(|(_, n)| *n == 1))
            .unwrap_or(false);
        let token_set = env
            .as_deref()
            .map(|c| {
                envfile::parse(c)
                    .iter()
                    .any(|(k, v)| k == envfile::EnvKey::BotToken.as_str() && !v.is_empty())
            })
            .unwrap_or(false);

        let unit = read(&paths.unit_file());
        let unit_current = unit.as_deref()
            == Some(ServiceUnitSpec::for_installation(ctx).render().as_str());

        Self {
            overlay_enabled: read(&paths.boot_config)
                .map(|c| overlay_present(&c))
                .unwrap_or(false),
            venv_present: ctx.python().exists(),
            env_file_complete,
            token_set,
            unit_installed: unit.is_some(),
            unit_current,
            audio_routed: read(&paths.asound_conf).as_deref()
                == Some(AudioRouteConfig::default().render().as_str()),
        }
    }

    pub fn print(&self) {
        let status = |b: bool| if b { "[present]" } else { "[missing]" };

        println!("{}  DAC overlay in boot config", status(self.overlay_enabled));
        println!("{}  Python virtual environment", status(self.venv_present));
        println!("{}  Environment file (all keys)", status(self.env_file_complete));
        println!("{}  Telegram bot token", status(self.token_set));
        println!("{}  systemd unit installed", status(self.unit_installed));
        if self.unit_installed && !self.unit_current {
            println!("           (differs from generated unit; re-run install)");
        }
        println!("{}  ALSA default routing", status(self.audio_routed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerSettings;
    use crate::context::Identity;
    use crate::input::Secrets;
    use crate::step::{envfile::write_env_file, unit::install_unit};
    use tempfile::tempdir;

    #[test]
    fn test_empty_host_has_nothing() {
        let scratch = tempdir().unwrap();
        let ctx = InstallationContext::new(Identity::current_for_testing(scratch.path()), None);
        let status = ArtifactStatus::inspect(&ctx, &SystemPaths::under(scratch.path()));
        assert_eq!(status, ArtifactStatus::default());
    }

    #[test]
    fn test_detects_written_artifacts() {
        let scratch = tempdir().unwrap();
        let ctx = InstallationContext::new(Identity::current_for_testing(scratch.path()), None);
        let paths = SystemPaths::under(&scratch.path().join("sys"));
        fs::create_dir_all(&ctx.unit_staging_dir).unwrap();

        let secrets = Secrets {
            bot_token: "123:abc".into(),
            ..Secrets::default()
        };
        write_env_file(&ctx, &PlayerSettings::default(), &secrets).unwrap();
        install_unit(&ctx, &paths).unwrap();

        let status = ArtifactStatus::inspect(&ctx, &paths);
        assert!(status.env_file_complete);
        assert!(status.token_set);
        assert!(status.unit_installed);
        assert!(status.unit_current);
        assert!(!status.overlay_enabled);
    }
}
