//! Command specification and execution options shared by both runners

use std::collections::HashMap;
use std::fmt;
use std::io::PipeReader;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use serde::Serialize;

/// Message logged when a command exits with an unexpected code
pub const DEFAULT_ERROR_MESSAGE: &str = "An error has occurred";

/// Exit code reported for a child terminated by SIGKILL
pub const DEFAULT_KILL_EXIT_CODE: i32 = -9;

/// An executable followed by its arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CommandSpec {
    executable: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Create a command from an executable and its arguments
    pub fn new<I, S>(executable: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a command from a token list whose first token is the executable
    ///
    /// Returns `None` for an empty list.
    pub fn from_tokens(tokens: Vec<String>) -> Option<Self> {
        let mut tokens = tokens.into_iter();
        let executable = tokens.next()?;
        Some(Self {
            executable,
            args: tokens.collect(),
        })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// All tokens, executable first
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.executable.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Build a std command with the options' working directory and environment
    pub(crate) fn std_command(&self, options: &ExecOptions) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args);

        if let Some(ref dir) = options.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write_token(f, token)?;
        }
        Ok(())
    }
}

/// Write a token, single-quoting it when it would not survive word splitting
fn write_token(f: &mut fmt::Formatter<'_>, token: &str) -> fmt::Result {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        f.write_str(token)
    } else {
        write!(f, "'{}'", token.replace('\'', r"'\''"))
    }
}

/// Options for running a command
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Message logged first when the exit code does not match
    pub error_message: String,
    /// Required exit code (None = any exit code is accepted)
    pub expected_exit_code: Option<i32>,
    /// Wall-clock limit for streamed runs (zero = no limit)
    pub timeout: Duration,
    /// Exit code tolerated in place of the expected one after a kill
    pub kill_exit_code: i32,
    /// Treat a timeout kill as a failure instead of tolerating it
    pub fail_on_timeout: bool,
    /// Working directory for the command
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set
    pub env: HashMap<String, String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            expected_exit_code: Some(0),
            timeout: Duration::ZERO,
            kill_exit_code: DEFAULT_KILL_EXIT_CODE,
            fail_on_timeout: false,
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl ExecOptions {
    /// Create options with a working directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Set the message logged on an unexpected exit code
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Set the required exit code, or `None` to accept any
    pub fn with_expected_exit_code(mut self, code: Option<i32>) -> Self {
        self.expected_exit_code = code;
        self
    }

    /// Set the timeout (zero disables it)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout in seconds (zero disables it)
    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    /// Set the exit code tolerated after a timeout kill
    pub fn with_kill_exit_code(mut self, code: i32) -> Self {
        self.kill_exit_code = code;
        self
    }

    /// Fail instead of tolerating a timeout kill
    pub fn with_fail_on_timeout(mut self, fail: bool) -> Self {
        self.fail_on_timeout = fail;
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Route the command's stdout and stderr into one pipe and return its read end
///
/// The command keeps write ends of the pipe until it is dropped, so it must be
/// dropped after spawning or the reader never sees end-of-file.
pub(crate) fn merged_pipe(cmd: &mut Command) -> std::io::Result<PipeReader> {
    let (reader, writer) = std::io::pipe()?;
    cmd.stdout(writer.try_clone()?);
    cmd.stderr(writer);
    Ok(reader)
}

/// Exit code of a finished child
///
/// A child terminated by a signal reports the negated signal number, so a
/// SIGKILL shows up as `-9`. Without either, `-1`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
