//! Configuration model for procwrap

use serde::{Deserialize, Serialize};

use crate::executor::{ExecOptions, DEFAULT_ERROR_MESSAGE, DEFAULT_KILL_EXIT_CODE};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Defaults applied to every run
    #[serde(default)]
    pub defaults: Defaults,

    /// Logging setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied to every run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Streamed-run timeout in seconds (0 = no timeout)
    #[serde(default)]
    pub timeout: u64,

    /// Required exit code
    #[serde(default)]
    pub expected_exit_code: i32,

    /// Whether the exit code is checked at all
    #[serde(default = "default_check_exit_code")]
    pub check_exit_code: bool,

    /// Message logged when a command exits with an unexpected code
    #[serde(default = "default_error_message")]
    pub error_message: String,

    /// Exit code tolerated after a timeout kill
    #[serde(default = "default_kill_exit_code")]
    pub kill_exit_code: i32,

    /// Treat timeout kills as failures
    #[serde(default)]
    pub fail_on_timeout: bool,
}

fn default_check_exit_code() -> bool {
    true
}

fn default_error_message() -> String {
    DEFAULT_ERROR_MESSAGE.to_string()
}

fn default_kill_exit_code() -> i32 {
    DEFAULT_KILL_EXIT_CODE
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: 0,
            expected_exit_code: 0,
            check_exit_code: default_check_exit_code(),
            error_message: default_error_message(),
            kill_exit_code: default_kill_exit_code(),
            fail_on_timeout: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable records
    #[default]
    Compact,
    /// Newline-delimited JSON records
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Level for procwrap's own events when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Execution options built from the configured defaults
    pub fn exec_options(&self) -> ExecOptions {
        let expected = self
            .defaults
            .check_exit_code
            .then_some(self.defaults.expected_exit_code);

        ExecOptions::default()
            .with_timeout_secs(self.defaults.timeout)
            .with_expected_exit_code(expected)
            .with_error_message(self.defaults.error_message.clone())
            .with_kill_exit_code(self.defaults.kill_exit_code)
            .with_fail_on_timeout(self.defaults.fail_on_timeout)
    }
}
