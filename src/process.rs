//! External command execution.
//!
//! Steps describe commands with [`Cmd`] and hand them to a [`Runner`].
//! [`SystemRunner`] spawns real processes; tests substitute a recording
//! runner so no package manager or systemd is touched.
//!
//! ```rust,ignore
//! let out = runner
//!     .run(&Cmd::new("systemctl").args(["enable", UNIT_NAME]))
//!     .await?;
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::context::ExecContext;
use crate::error::CommandError;

/// A command to run.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    exec: Option<ExecContext>,
    timeout: Option<Duration>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run as another account from a given directory.
    pub fn exec_as(mut self, ctx: ExecContext) -> Self {
        self.exec = Some(ctx);
        self
    }

    /// Kill the command if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Return the output even on non-zero exit.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn exec_context(&self) -> Option<&ExecContext> {
        self.exec.as_ref()
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    /// Exit code, `None` if killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something that can run a [`Cmd`].
#[allow(async_fn_in_trait)]
pub trait Runner {
    /// Run to completion.
    ///
    /// Non-zero exit is an error unless the command was marked
    /// [`Cmd::allow_fail`].
    async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, CommandError>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, CommandError> {
        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        if let Some(ctx) = &cmd.exec {
            // std drops supplementary groups when switching away from root
            command
                .uid(ctx.uid)
                .gid(ctx.gid)
                .current_dir(&ctx.working_dir)
                .env("HOME", &ctx.home)
                .env("USER", &ctx.name)
                .env("LOGNAME", &ctx.name);
        }

        tracing::debug!(command = %cmd, user = ?cmd.exec.as_ref().map(|c| &c.name), "running");

        let output = match cmd.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(CommandError::TimedOut {
                        command: cmd.to_string(),
                        after: limit,
                    })
                }
            },
            None => command.output().await,
        }
        .map_err(|source| CommandError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        let result = CmdOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::trace!(command = %cmd, stdout = %result.stdout, "finished");

        check(cmd, result)
    }
}

/// Turn a non-zero exit into an error unless the command allows failure.
pub fn check(cmd: &Cmd, output: CmdOutput) -> Result<CmdOutput, CommandError> {
    if output.success() || cmd.allow_fail {
        Ok(output)
    } else {
        Err(CommandError::Failed {
            command: cmd.to_string(),
            status: output.status,
            stderr: output.stderr,
        })
    }
}

/// Locate an executable on `PATH`.
pub fn which(tool: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording runner used by step tests.

    use super::*;
    use std::cell::RefCell;

    /// Records every command instead of running it.
    ///
    /// Commands whose rendered text starts with a registered prefix fail
    /// with exit status 1; everything else succeeds with empty output.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub commands: RefCell<Vec<Cmd>>,
        failing: Vec<String>,
        stdout: Vec<(String, String)>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_on(mut self, prefix: &str) -> Self {
            self.failing.push(prefix.to_string());
            self
        }

        pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
            self.stdout.push((prefix.to_string(), stdout.to_string()));
            self
        }

        /// Rendered command lines, in order.
        pub fn lines(&self) -> Vec<String> {
            self.commands.borrow().iter().map(ToString::to_string).collect()
        }
    }

    impl Runner for RecordingRunner {
        async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, CommandError> {
            self.commands.borrow_mut().push(cmd.clone());
            let line = cmd.to_string();

            let status = if self.failing.iter().any(|p| line.starts_with(p.as_str())) {
                Some(1)
            } else {
                Some(0)
            };
            let stdout = self
                .stdout
                .iter()
                .find(|(p, _)| line.starts_with(p.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default();

            check(
                cmd,
                CmdOutput {
                    status,
                    stdout,
                    stderr: String::new(),
                },
            )
        }
    }
}
