//! Error types for procwrap
//!
//! Every failure the runners and the argument-file reader can detect is a
//! variant of [`ExecError`]. Each variant knows the exit code the host process
//! should terminate with, and how to log its diagnostic bundle. Terminating is
//! left to the caller: [`OrExit::or_exit`] is the fail-fast default used by
//! the binary.

use serde::Serialize;
use thiserror::Error;

/// Exit code for failures that never got a child exit status
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Exit code for unusable argument files (conventional usage-error code)
pub const ARG_FILE_EXIT_CODE: i32 = 2;

/// Main error type for process execution
#[derive(Error, Debug)]
pub enum ExecError {
    /// The executable could not be started
    #[error("Unable to run executable: {command}")]
    LaunchFailure {
        executable: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child ran but exited with a code other than the expected one
    #[error("{message} (exit code {exit_code}): {command}")]
    UnexpectedExitCode {
        message: String,
        command: String,
        exit_code: i32,
        output: String,
    },

    /// The child was killed by the deadline and kills are not tolerated
    #[error("Command killed after {timeout_secs:.1}s timeout: {command}")]
    TimeoutKill {
        command: String,
        timeout_secs: f64,
        exit_code: i32,
        output: String,
    },

    /// An argument-file line could not be split into words
    #[error("Unable to parse argument string: {reason}")]
    TokenizeFailure { line: String, reason: String },

    /// An argument file could not be used
    #[error("Argument file {path}: {reason}")]
    ArgFile { path: String, reason: String },

    /// Reading output or waiting for the child failed
    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        output: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Exit code the host process terminates with under the fail-fast policy
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::UnexpectedExitCode { exit_code, .. } => *exit_code,
            ExecError::TimeoutKill { exit_code, .. } => *exit_code,
            ExecError::ArgFile { .. } => ARG_FILE_EXIT_CODE,
            ExecError::LaunchFailure { .. }
            | ExecError::TokenizeFailure { .. }
            | ExecError::Io { .. } => FAILURE_EXIT_CODE,
        }
    }

    /// Output captured before the failure, if there was any
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecError::UnexpectedExitCode { output, .. }
            | ExecError::TimeoutKill { output, .. }
            | ExecError::Io { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }

    /// Log the diagnostic bundle for this error at error level
    pub fn report(&self) {
        match self {
            ExecError::LaunchFailure {
                executable,
                command,
                source,
            } => {
                tracing::error!("Unable to run given executable, does it exist?");
                tracing::error!("executable: {}", command);
                tracing::error!("error: {}", source);
                if let Some(hint) = launch_hint(executable, source) {
                    tracing::error!("hint: {}", hint);
                }
            }
            ExecError::UnexpectedExitCode {
                message,
                command,
                exit_code,
                output,
            } => {
                tracing::error!("{}", message);
                tracing::error!("Return code: {}", exit_code);
                tracing::error!("Command used: {}", command);
                tracing::error!("Trace:\n{}", output);
            }
            ExecError::TimeoutKill {
                command,
                timeout_secs,
                exit_code,
                output,
            } => {
                tracing::error!("Killed by timeout after {:.1}s", timeout_secs);
                tracing::error!("Return code: {}", exit_code);
                tracing::error!("Command used: {}", command);
                tracing::error!("Trace:\n{}", output);
            }
            ExecError::TokenizeFailure { line, reason } => {
                tracing::error!("Unable to parse argument string ({})", reason);
                tracing::error!("given string: {}", line);
            }
            ExecError::ArgFile { path, reason } => {
                tracing::error!("Unable to read argument file {}: {}", path, reason);
            }
            ExecError::Io {
                command,
                output,
                source,
            } => {
                tracing::error!("Failure while running executable");
                tracing::error!("executable: {}", command);
                tracing::error!("error: {}", source);
                if !output.is_empty() {
                    tracing::error!("Trace:\n{}", output);
                }
            }
        }
    }

    /// Log the diagnostic bundle and terminate the host process
    pub fn exit(&self) -> ! {
        self.report();
        std::process::exit(self.exit_code())
    }
}

/// Fail-fast extension for results carrying an [`ExecError`]
pub trait OrExit<T> {
    /// Unwrap the value, or report the error and exit with its exit code
    fn or_exit(self) -> T;
}

impl<T> OrExit<T> for Result<T, ExecError> {
    fn or_exit(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => err.exit(),
        }
    }
}

/// Serializable error info for JSON output
#[derive(Debug, Serialize, Clone)]
pub struct ErrorInfo {
    pub message: String,
    pub error_type: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&ExecError> for ErrorInfo {
    fn from(err: &ExecError) -> Self {
        let error_type = match err {
            ExecError::LaunchFailure { .. } => "launch_failure",
            ExecError::UnexpectedExitCode { .. } => "unexpected_exit_code",
            ExecError::TimeoutKill { .. } => "timeout_kill",
            ExecError::TokenizeFailure { .. } => "tokenize_failure",
            ExecError::ArgFile { .. } => "arg_file",
            ExecError::Io { .. } => "io_error",
        };
        let suggestion = match err {
            ExecError::LaunchFailure {
                executable, source, ..
            } => launch_hint(executable, source),
            ExecError::TimeoutKill { .. } => {
                Some("Increase the timeout or check whether the command hangs".to_string())
            }
            ExecError::TokenizeFailure { .. } => {
                Some("Check the line for an unclosed quote or a trailing backslash".to_string())
            }
            _ => None,
        };

        ErrorInfo {
            message: err.to_string(),
            error_type: error_type.to_string(),
            exit_code: err.exit_code(),
            output: err.output().filter(|o| !o.is_empty()).map(str::to_string),
            suggestion,
        }
    }
}

/// Suggest a fix for a launch failure
fn launch_hint(executable: &str, source: &std::io::Error) -> Option<String> {
    match source.kind() {
        std::io::ErrorKind::NotFound => {
            if which::which(executable).is_err() {
                Some(format!(
                    "'{}' was not found on PATH. Install it or pass an absolute path.",
                    executable
                ))
            } else {
                Some("The working directory may not exist.".to_string())
            }
        }
        std::io::ErrorKind::PermissionDenied => Some(format!(
            "'{}' is not executable. Check its permissions.",
            executable
        )),
        _ => None,
    }
}
