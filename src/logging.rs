//! Logging initialization and configuration.
//!
//! Events go to stderr so that stdout only carries the output of the
//! commands being run.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` when set, otherwise `procwrap=<level>`
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("procwrap={}", normalize_level(level))))
}

/// Map a configured level name onto a tracing directive
fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Try to initialize the logging system.
///
/// Returns `Err` if a global subscriber has already been set.
pub fn try_init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(build_filter(&config.level));

    match config.format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
}

/// Initialize the logging system.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init(config: &LoggingConfig) {
    if let Err(e) = try_init(config) {
        panic!("failed to initialize logging: {}", e);
    }
}
