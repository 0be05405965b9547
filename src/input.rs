//! Operator input: secrets and the reboot confirmation.
//!
//! Provisioning only sees the [`OperatorInput`] trait. The interactive
//! [`Prompt`] asks on the terminal; [`PresetInput`] takes the same fields
//! from the environment or an answers file, for unattended runs.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, IsTerminal, StdinLock, Stdout, Write};
use std::path::Path;

use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::error::{ProvisionError, Result};
use crate::step::envfile::{self, EnvKey};

/// Credentials and tokens collected from the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub bot_token: String,
    /// Comma-separated Telegram user IDs.
    pub allowed_users: String,
    pub share_username: String,
    pub share_password: String,
}

impl Secrets {
    /// Secrets paired with the env keys they fill.
    pub fn entries(&self) -> [(EnvKey, &str); 4] {
        [
            (EnvKey::BotToken, self.bot_token.as_str()),
            (EnvKey::AllowedUsers, self.allowed_users.as_str()),
            (EnvKey::ServerUsername, self.share_username.as_str()),
            (EnvKey::ServerPassword, self.share_password.as_str()),
        ]
    }

    pub fn has_token(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

/// Source of operator answers.
pub trait OperatorInput {
    /// Collect the bot token, allow-list and share credentials.
    fn secrets(&mut self) -> Result<Secrets>;

    /// Ask whether to reboot now.
    fn confirm_reboot(&mut self) -> Result<bool>;
}

/// Interactive terminal prompts.
pub struct Prompt<R, W> {
    reader: R,
    writer: W,
    /// Disable echo for hidden answers.
    tty: bool,
}

impl Prompt<StdinLock<'static>, Stdout> {
    /// Prompt on the process's stdin/stdout.
    pub fn stdio() -> Self {
        let stdin = io::stdin();
        let tty = stdin.is_terminal();
        Self {
            reader: stdin.lock(),
            writer: io::stdout(),
            tty,
        }
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            tty: false,
        }
    }

    fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.writer, "{}: ", question)?;
        self.writer.flush()?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn ask_hidden(&mut self, question: &str) -> io::Result<String> {
        if !self.tty {
            return self.ask(question);
        }
        let answer = {
            let _echo = EchoOff::new()?;
            self.ask(question)?
        };
        // the operator's Enter was not echoed
        writeln!(self.writer)?;
        Ok(answer)
    }
}

impl<R: BufRead, W: Write> OperatorInput for Prompt<R, W> {
    fn secrets(&mut self) -> Result<Secrets> {
        let mut collect = || -> io::Result<Secrets> {
            writeln!(self.writer)?;
            writeln!(self.writer, "Telegram bot token (from @BotFather).")?;
            let bot_token = self.ask("Bot token")?;
            writeln!(
                self.writer,
                "Telegram user IDs allowed to control the player, comma-separated (blank = anyone)."
            )?;
            let allowed_users = self.ask("Allowed users")?;
            writeln!(self.writer, "Music share credentials (blank for guest access).")?;
            let share_username = self.ask("Share username")?;
            let share_password = self.ask_hidden("Share password")?;
            Ok(Secrets {
                bot_token,
                allowed_users,
                share_username,
                share_password,
            })
        };
        collect().map_err(ProvisionError::Input)
    }

    fn confirm_reboot(&mut self) -> Result<bool> {
        let answer = self
            .ask("Reboot now to enable the DAC overlay? [y/N]")
            .map_err(ProvisionError::Input)?;
        Ok(matches!(answer.chars().next(), Some('y' | 'Y')))
    }
}

/// Restores terminal echo on drop.
struct EchoOff {
    saved: Termios,
}

impl EchoOff {
    fn new() -> io::Result<Self> {
        let stdin = io::stdin();
        let saved = termios::tcgetattr(&stdin)?;
        let mut quiet = saved.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &quiet)?;
        Ok(Self { saved })
    }
}

impl Drop for EchoOff {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&io::stdin(), SetArg::TCSANOW, &self.saved);
    }
}

/// Answers supplied up front, from the environment or a file.
#[derive(Debug, Clone, Default)]
pub struct PresetInput {
    values: HashMap<String, String>,
    reboot: bool,
}

impl PresetInput {
    pub fn new(values: HashMap<String, String>, reboot: bool) -> Self {
        Self { values, reboot }
    }

    /// Read `TELEGRAM_BOT_TOKEN`, `ALLOWED_TELEGRAM_USERS`,
    /// `MUSIC_SERVER_USERNAME` and `MUSIC_SERVER_PASSWORD` from the
    /// process environment.
    pub fn from_env(reboot: bool) -> Self {
        let values = EnvKey::ALL
            .iter()
            .filter(|key| key.is_secret())
            .filter_map(|key| {
                std::env::var(key.as_str())
                    .ok()
                    .map(|v| (key.as_str().to_string(), v))
            })
            .collect();
        Self { values, reboot }
    }

    /// Read answers from a `KEY=value` file.
    pub fn from_file(path: &Path, reboot: bool) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ProvisionError::io(path, e))?;
        Ok(Self {
            values: envfile::parse(&content).into_iter().collect(),
            reboot,
        })
    }

    fn value(&self, key: EnvKey) -> String {
        self.values
            .get(key.as_str())
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }
}

impl OperatorInput for PresetInput {
    fn secrets(&mut self) -> Result<Secrets> {
        Ok(Secrets {
            bot_token: self.value(EnvKey::BotToken),
            allowed_users: self.value(EnvKey::AllowedUsers),
            share_username: self.value(EnvKey::ServerUsername),
            share_password: self.value(EnvKey::ServerPassword),
        })
    }

    fn confirm_reboot(&mut self) -> Result<bool> {
        Ok(self.reboot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_prompt_order() {
        let input = Cursor::new("123:abc\n 11, 22 \nalice\nhunter2\n");
        let mut output = Vec::new();
        let secrets = Prompt::new(input, &mut output).secrets().unwrap();

        assert_eq!(
            secrets,
            Secrets {
                bot_token: "123:abc".into(),
                allowed_users: "11, 22".into(),
                share_username: "alice".into(),
                share_password: "hunter2".into(),
            }
        );

        let shown = String::from_utf8(output).unwrap();
        let token_at = shown.find("Bot token").unwrap();
        let users_at = shown.find("Allowed users").unwrap();
        let name_at = shown.find("Share username").unwrap();
        let pass_at = shown.find("Share password").unwrap();
        assert!(token_at < users_at && users_at < name_at && name_at < pass_at);
    }

    #[test]
    fn test_empty_answers_are_accepted() {
        let input = Cursor::new("\n\n\n\n");
        let secrets = Prompt::new(input, Vec::new()).secrets().unwrap();
        assert_eq!(secrets, Secrets::default());
        assert!(!secrets.has_token());
    }

    #[test]
    fn test_eof_yields_blank_answers() {
        let secrets = Prompt::new(Cursor::new(""), Vec::new()).secrets().unwrap();
        assert_eq!(secrets, Secrets::default());
    }

    #[test]
    fn test_confirm_reboot() {
        assert!(Prompt::new(Cursor::new("y\n"), Vec::new()).confirm_reboot().unwrap());
        assert!(Prompt::new(Cursor::new("Yes\n"), Vec::new()).confirm_reboot().unwrap());
        assert!(!Prompt::new(Cursor::new("n\n"), Vec::new()).confirm_reboot().unwrap());
        assert!(!Prompt::new(Cursor::new("\n"), Vec::new()).confirm_reboot().unwrap());
    }

    #[test]
    fn test_answers_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("answers");
        fs::write(
            &path,
            "# unattended install\nTELEGRAM_BOT_TOKEN=123:abc\nMUSIC_SERVER_USERNAME=alice\n",
        )
        .unwrap();

        let mut input = PresetInput::from_file(&path, true).unwrap();
        let secrets = input.secrets().unwrap();

        assert_eq!(secrets.bot_token, "123:abc");
        assert_eq!(secrets.share_username, "alice");
        assert!(secrets.share_password.is_empty());
        assert!(input.confirm_reboot().unwrap());
    }

    #[test]
    fn test_missing_answers_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(PresetInput::from_file(&dir.path().join("nope"), false).is_err());
    }
}
