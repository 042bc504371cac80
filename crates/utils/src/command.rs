use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// A command exited with a status this caller did not tolerate.
#[derive(Debug, thiserror::Error)]
#[error("command `{cmd}` failed (exit {rc:?}): {stderr}")]
pub struct CommandError {
    /// The program and arguments, for diagnostics.
    pub cmd: String,
    /// The process exit code, if the process wasn't killed by a signal.
    pub rc: Option<i32>,
    /// Captured standard error, trimmed.
    pub stderr: String,
}

fn describe(cmd: &Command) -> String {
    let mut s = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        s.push(' ');
        s.push_str(&arg.to_string_lossy());
    }
    s
}

fn error_for(cmd: &Command, out: &Output) -> CommandError {
    CommandError {
        cmd: describe(cmd),
        rc: out.status.code(),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

/// Extension trait on [`std::process::Command`] for synchronously running a
/// command and mapping its result, used in place of hand-rolling
/// `Command::output()` call sites throughout the codebase.
pub trait CommandRunExt {
    /// Log this command at debug level before running it. Returns `self`
    /// for chaining onto the eventual `run*` call.
    fn log_debug(&mut self) -> &mut Self;

    /// Run the command, discarding stdout; requires a zero exit status.
    fn run(&mut self) -> Result<()>;

    /// Run the command and return its trimmed stdout as a string; requires
    /// a zero exit status.
    fn run_get_string(&mut self) -> Result<String>;

    /// Run the command, returning trimmed stdout; on a non-zero exit the
    /// error carries the captured stderr.
    fn run_capture_stderr(&mut self) -> Result<String>;

    /// Run the command and parse its stdout as JSON; requires a zero exit
    /// status.
    fn run_and_parse_json<T: DeserializeOwned>(&mut self) -> Result<T>;

    /// Run the command, tolerating any exit code present in `rcs` in
    /// addition to zero. Returns the exit code actually observed.
    fn run_with_rcs(&mut self, rcs: &[i32]) -> Result<i32>;
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("running: {}", describe(self));
        self
    }

    fn run(&mut self) -> Result<()> {
        self.run_with_rcs(&[]).map(|_| ())
    }

    fn run_get_string(&mut self) -> Result<String> {
        let out = self
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", describe(self)))?;
        if !out.status.success() {
            return Err(error_for(self, &out).into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn run_capture_stderr(&mut self) -> Result<String> {
        self.run_get_string()
    }

    fn run_and_parse_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let out = self
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", describe(self)))?;
        if !out.status.success() {
            return Err(error_for(self, &out).into());
        }
        serde_json::from_slice(&out.stdout)
            .with_context(|| format!("parsing JSON output of {}", describe(self)))
    }

    fn run_with_rcs(&mut self, rcs: &[i32]) -> Result<i32> {
        let out = self
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", describe(self)))?;
        let rc = out.status.code();
        if out.status.success() || rc.is_some_and(|c| rcs.contains(&c)) {
            return Ok(rc.unwrap_or(0));
        }
        Err(error_for(self, &out).into())
    }
}
