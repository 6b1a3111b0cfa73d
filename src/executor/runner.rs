//! Synchronous command execution
//!
//! Runs a command to completion with stdout and stderr merged into one
//! stream, then checks the exit code against the expected one.

use std::io::Read;
use std::time::Instant;

use serde::Serialize;

use super::command::{exit_code_of, merged_pipe, CommandSpec, ExecOptions};
use crate::error::ExecError;

/// Result of a synchronous run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Command line that was executed
    pub command: String,
    /// Merged stdout/stderr, decoded as UTF-8 (invalid bytes replaced)
    pub output: String,
    /// Exit code of the child
    pub exit_code: i32,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command to completion and capture its merged output
///
/// # Errors
/// * `ExecError::LaunchFailure` - If the command couldn't be spawned
/// * `ExecError::Io` - If reading output or waiting for the child failed
/// * `ExecError::UnexpectedExitCode` - If the exit code differs from
///   `options.expected_exit_code`
pub fn exec_sync(spec: &CommandSpec, options: &ExecOptions) -> Result<ExecutionResult, ExecError> {
    let start = Instant::now();
    let command_str = spec.to_string();

    let launch_failure = |source| ExecError::LaunchFailure {
        executable: spec.executable().to_string(),
        command: command_str.clone(),
        source,
    };

    let mut cmd = spec.std_command(options);
    let mut reader = merged_pipe(&mut cmd).map_err(launch_failure)?;

    tracing::debug!("Executing: {}", command_str);

    let mut child = cmd.spawn().map_err(launch_failure)?;
    // Release our copies of the pipe's write end
    drop(cmd);

    let mut raw = Vec::with_capacity(4096);
    if let Err(source) = reader.read_to_end(&mut raw) {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ExecError::Io {
            command: command_str,
            output: String::from_utf8_lossy(&raw).into_owned(),
            source,
        });
    }

    let output = String::from_utf8_lossy(&raw).into_owned();
    let status = match child.wait() {
        Ok(status) => status,
        Err(source) => {
            return Err(ExecError::Io {
                command: command_str,
                output,
                source,
            })
        }
    };
    let exit_code = exit_code_of(status);

    tracing::debug!("{} exited with code {}", command_str, exit_code);

    if let Some(expected) = options.expected_exit_code {
        if exit_code != expected {
            return Err(ExecError::UnexpectedExitCode {
                message: options.error_message.clone(),
                command: command_str,
                exit_code,
                output,
            });
        }
    }

    Ok(ExecutionResult {
        command: command_str,
        output,
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run `executable` with `args` and return its merged output
///
/// `expected_exit_code` of `None` accepts any exit code.
pub fn run<S: AsRef<str>>(
    executable: &str,
    args: &[S],
    error_message: &str,
    expected_exit_code: Option<i32>,
) -> Result<String, ExecError> {
    let spec = CommandSpec::new(executable, args.iter().map(|a| a.as_ref()));
    let options = ExecOptions::default()
        .with_error_message(error_message)
        .with_expected_exit_code(expected_exit_code);

    exec_sync(&spec, &options).map(|result| result.output)
}
