//! The player's `.env` file.
//!
//! Written in two phases: a template with every key present and secrets
//! blank, then one in-place patch per secret the operator supplied. The
//! key set of the file is therefore the same whichever optional values
//! were given.

use std::fmt;

use crate::config::PlayerSettings;
use crate::context::InstallationContext;
use crate::error::Result;
use crate::input::Secrets;
use crate::reconcile::{self, Change};
use crate::step::filesystem::set_owner;

/// Secrets live in this file, so only the operator may read it.
pub const ENV_FILE_MODE: u32 = 0o600;

/// Keys the player reads, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKey {
    ServerIp,
    ServerShare,
    ServerUsername,
    ServerPassword,
    BotToken,
    AllowedUsers,
    Volume,
}

impl EnvKey {
    pub const ALL: [EnvKey; 7] = [
        EnvKey::ServerIp,
        EnvKey::ServerShare,
        EnvKey::ServerUsername,
        EnvKey::ServerPassword,
        EnvKey::BotToken,
        EnvKey::AllowedUsers,
        EnvKey::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvKey::ServerIp => "MUSIC_SERVER_IP",
            EnvKey::ServerShare => "MUSIC_SERVER_SHARE",
            EnvKey::ServerUsername => "MUSIC_SERVER_USERNAME",
            EnvKey::ServerPassword => "MUSIC_SERVER_PASSWORD",
            EnvKey::BotToken => "TELEGRAM_BOT_TOKEN",
            EnvKey::AllowedUsers => "ALLOWED_TELEGRAM_USERS",
            EnvKey::Volume => "PLAYER_VOLUME",
        }
    }

    /// Secret keys are blank in the template and filled by patching.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            EnvKey::ServerUsername
                | EnvKey::ServerPassword
                | EnvKey::BotToken
                | EnvKey::AllowedUsers
        )
    }
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full key/value set for the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    values: Vec<(EnvKey, String)>,
}

impl EnvConfig {
    /// Every key, with settings filled in and secrets blank.
    pub fn template(settings: &PlayerSettings) -> Self {
        let values = EnvKey::ALL
            .iter()
            .map(|&key| {
                let value = match key {
                    EnvKey::ServerIp => sanitize(&settings.server_ip),
                    EnvKey::ServerShare => sanitize(&settings.share),
                    EnvKey::Volume => settings.volume.to_string(),
                    _ => String::new(),
                };
                (key, value)
            })
            .collect();
        Self { values }
    }

    /// `KEY=value` lines, unquoted, one per key.
    pub fn render(&self) -> String {
        self.values
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect()
    }
}

/// Drop line breaks so a value can never smuggle in another key.
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Set `key` to `value` on the line whose key matches exactly.
///
/// All other lines are left byte-for-byte as they were.
pub fn patch(content: &str, key: EnvKey, value: &str) -> String {
    let value = sanitize(value);
    let mut patched = String::with_capacity(content.len() + value.len());
    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        match body.split_once('=') {
            Some((k, _)) if k == key.as_str() => {
                patched.push_str(key.as_str());
                patched.push('=');
                patched.push_str(&value);
                if line.ends_with('\n') {
                    patched.push('\n');
                }
            }
            _ => patched.push_str(line),
        }
    }
    patched
}

/// Parse `KEY=value` lines, skipping blanks and `#` comments.
pub fn parse(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

/// How many times each schema key appears in `content`.
pub fn key_counts(content: &str) -> Vec<(EnvKey, usize)> {
    let entries = parse(content);
    EnvKey::ALL
        .iter()
        .map(|&key| {
            let count = entries.iter().filter(|(k, _)| k == key.as_str()).count();
            (key, count)
        })
        .collect()
}

/// Write the template, then patch in each supplied secret.
pub fn write_env_file(
    ctx: &InstallationContext,
    settings: &PlayerSettings,
    secrets: &Secrets,
) -> Result<()> {
    let path = ctx.env_file();
    let template = EnvConfig::template(settings).render();

    reconcile::apply(&path, Some(ENV_FILE_MODE), |_| Ok(Change::Replace(template)))?;

    let mut patched = Vec::new();
    for (key, value) in secrets.entries() {
        if value.is_empty() {
            continue;
        }
        reconcile::apply(&path, Some(ENV_FILE_MODE), |current| {
            Ok(Change::Replace(patch(current.unwrap_or_default(), key, value)))
        })?;
        patched.push(key.as_str());
    }
    set_owner(&path, &ctx.identity)?;

    println!("  Wrote {}", path.display());
    if !patched.is_empty() {
        println!("  Set: {}", patched.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, InstallationContext) {
        let home = tempdir().unwrap();
        let ctx = InstallationContext::new(Identity::current_for_testing(home.path()), None);
        fs::create_dir_all(&ctx.root).unwrap();
        (home, ctx)
    }

    #[test]
    fn test_template_has_all_keys_with_blank_secrets() {
        let rendered = EnvConfig::template(&PlayerSettings::default()).render();
        assert_eq!(
            rendered,
            "MUSIC_SERVER_IP=192.168.0.3\n\
             MUSIC_SERVER_SHARE=music\n\
             MUSIC_SERVER_USERNAME=\n\
             MUSIC_SERVER_PASSWORD=\n\
             TELEGRAM_BOT_TOKEN=\n\
             ALLOWED_TELEGRAM_USERS=\n\
             PLAYER_VOLUME=70\n"
        );
    }

    #[test]
    fn test_patch_username_only_touches_its_line() {
        let template = EnvConfig::template(&PlayerSettings::default()).render();
        let patched = patch(&template, EnvKey::ServerUsername, "alice");

        let before: Vec<&str> = template.lines().collect();
        let after: Vec<&str> = patched.lines().collect();
        assert_eq!(before.len(), after.len());
        for (old, new) in before.iter().zip(&after) {
            if old.starts_with("MUSIC_SERVER_USERNAME=") {
                assert_eq!(*new, "MUSIC_SERVER_USERNAME=alice");
            } else {
                assert_eq!(old, new);
            }
        }
        assert!(patched.contains("\nMUSIC_SERVER_PASSWORD=\n"));
    }

    #[test]
    fn test_patch_requires_exact_key() {
        let content = "MUSIC_SERVER_USERNAME_OLD=x\nMUSIC_SERVER_USERNAME=\n";
        let patched = patch(content, EnvKey::ServerUsername, "bob");
        assert_eq!(patched, "MUSIC_SERVER_USERNAME_OLD=x\nMUSIC_SERVER_USERNAME=bob\n");
    }

    #[test]
    fn test_patch_strips_line_breaks() {
        let patched = patch("TELEGRAM_BOT_TOKEN=\n", EnvKey::BotToken, "abc\nPLAYER_VOLUME=0");
        assert_eq!(patched, "TELEGRAM_BOT_TOKEN=abcPLAYER_VOLUME=0\n");
    }

    #[test]
    fn test_every_key_exactly_once_regardless_of_secrets() {
        let (_home, ctx) = setup();
        let cases = [
            Secrets::default(),
            Secrets {
                bot_token: "123:abc".into(),
                ..Secrets::default()
            },
            Secrets {
                bot_token: "123:abc".into(),
                allowed_users: "1,2".into(),
                share_username: "alice".into(),
                share_password: "s3cret".into(),
            },
        ];

        for secrets in &cases {
            write_env_file(&ctx, &PlayerSettings::default(), secrets).unwrap();
            let content = fs::read_to_string(ctx.env_file()).unwrap();
            for (key, count) in key_counts(&content) {
                assert_eq!(count, 1, "{} in {:?}", key, content);
            }
        }
    }

    #[test]
    fn test_username_alice_blank_password() {
        let (_home, ctx) = setup();
        let secrets = Secrets {
            share_username: "alice".into(),
            ..Secrets::default()
        };

        write_env_file(&ctx, &PlayerSettings::default(), &secrets).unwrap();

        let content = fs::read_to_string(ctx.env_file()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines.contains(&"MUSIC_SERVER_USERNAME=alice"));
        assert!(lines.contains(&"MUSIC_SERVER_PASSWORD="));
        assert!(lines.contains(&"TELEGRAM_BOT_TOKEN="));
        assert!(lines.contains(&"PLAYER_VOLUME=70"));
    }

    #[test]
    fn test_env_file_is_private() {
        let (_home, ctx) = setup();
        write_env_file(&ctx, &PlayerSettings::default(), &Secrets::default()).unwrap();

        let mode = fs::metadata(ctx.env_file()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, ENV_FILE_MODE);
    }

    #[test]
    fn test_parse_skips_comments() {
        let entries = parse("# header\n\nA=1\nB=\n");
        assert_eq!(
            entries,
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), String::new())]
        );
    }

    #[test]
    fn test_symlinked_env_file_leaves_target_alone() {
        let (home, ctx) = setup();
        let victim = home.path().join("shadow");
        fs::write(&victim, "root:$6$hash:19000:0:99999:7:::\n").unwrap();
        fs::set_permissions(&victim, fs::Permissions::from_mode(0o640)).unwrap();
        std::os::unix::fs::symlink(&victim, ctx.env_file()).unwrap();

        let secrets = Secrets {
            bot_token: "123:abc".into(),
            ..Secrets::default()
        };
        write_env_file(&ctx, &PlayerSettings::default(), &secrets).unwrap();

        assert_eq!(
            fs::read_to_string(&victim).unwrap(),
            "root:$6$hash:19000:0:99999:7:::\n"
        );
        let mode = fs::metadata(&victim).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);

        let meta = fs::symlink_metadata(ctx.env_file()).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(meta.permissions().mode() & 0o777, ENV_FILE_MODE);
        assert!(fs::read_to_string(ctx.env_file())
            .unwrap()
            .contains("TELEGRAM_BOT_TOKEN=123:abc\n"));
    }
}
