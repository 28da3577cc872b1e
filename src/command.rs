use core::fmt;
use std::{
    borrow::Cow,
    fmt::{Debug, Display},
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use stacked_errors::{DisplayStr, StackableErr};
use tracing::debug;

use crate::{ErisError, Result};

/// A host command, `tokio::process::Command` with the bits `eris update`
/// needs: a working directory, extra environment, and optionally forwarding
/// output to the terminal instead of capturing it.
#[derive(Clone)]
pub struct Command {
    pub command: String,
    pub args: Vec<String>,
    /// Environment variable mappings
    pub envs: Vec<(String, String)>,
    /// Working directory for process
    pub cwd: Option<PathBuf>,
    /// Forward stdout and stderr to the current process instead of capturing
    pub ci: bool,
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("envs", &self.envs)
            .field("cwd", &self.cwd)
            .finish()
    }
}

#[must_use]
#[derive(Clone)]
pub struct CommandResult {
    // kept around for failures
    pub command: Command,
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Debug for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandResult")
            .field("command", &self.command)
            .field("status", &self.status)
            .field("stdout", &DisplayStr(&self.stdout_as_utf8_lossy()))
            .field("stderr", &DisplayStr(&self.stderr_as_utf8_lossy()))
            .finish()
    }
}

impl Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Command {
    /// `cmd_with_args` is separated by whitespace, the first part becomes the
    /// command and the others are prefixed to `args`
    pub fn new(cmd_with_args: &str, args: &[&str]) -> Self {
        let mut parts = cmd_with_args.split_whitespace().map(str::to_owned);
        let command = parts.next().unwrap_or_default();
        let args = parts.chain(args.iter().map(|a| (*a).to_owned())).collect();
        Self {
            command,
            args,
            envs: vec![],
            cwd: None,
            ci: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, env_key: &str, env_val: &str) -> Self {
        self.envs.push((env_key.to_owned(), env_val.to_owned()));
        self
    }

    pub fn ci_mode(mut self, ci_mode: bool) -> Self {
        self.ci = ci_mode;
        self
    }

    /// Runs the command until it exits. Failing to spawn is an error, a
    /// non-zero exit is not (see [CommandResult::assert_success]).
    pub async fn run_to_completion(self) -> Result<CommandResult> {
        debug!(command = ?self, "running");
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if self.ci {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        let output = cmd
            .output()
            .await
            .stack_err_with(|| format!("{self:?}.run_to_completion() -> failed to spawn"))
            .map_err(ErisError::CommandFailed)?;
        Ok(CommandResult {
            command: self,
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl CommandResult {
    pub fn successful(&self) -> bool {
        self.status.success()
    }

    pub fn assert_success(&self) -> Result<()> {
        if self.successful() {
            Ok(())
        } else {
            Err(ErisError::CommandFailed(stacked_errors::Error::from_err(
                format!("{self:#?}.assert_success() -> unsuccessful"),
            )))
        }
    }

    pub fn stdout_as_utf8_lossy(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_utf8_lossy(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.stderr)
    }
}
