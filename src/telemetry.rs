//! Structured logging infrastructure.
//!
//! Built on `tracing` and `tracing-subscriber`: structured events with an
//! environment-based filter (`RUST_LOG` wins over the configured level) and
//! pretty, compact, or JSON output.
//!
//! # Example
//! ```no_run
//! use ophyd_field::{config::AppConfig, telemetry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! telemetry::init_from_config(&config)?;
//! tracing::info!("application started");
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::AppConfig;
use crate::error::{AppResult, FieldError};

/// Output format for tracing.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development).
    #[default]
    Pretty,
    /// Compact format without colors (for production).
    Compact,
    /// JSON format for structured logging (for log aggregation).
    Json,
}

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Level,
    /// Output format.
    pub format: OutputFormat,
    /// Whether to include file and line numbers.
    pub with_file_and_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_file_and_line: false,
        }
    }
}

impl TracingConfig {
    /// Create tracing config at the given level.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Parse a configuration log-level string.
fn parse_log_level(level: &str) -> AppResult<Level> {
    match level {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(FieldError::Configuration(format!(
            "Invalid log level: {other}"
        ))),
    }
}

/// Initialize tracing from the application configuration.
pub fn init_from_config(config: &AppConfig) -> AppResult<()> {
    let level = parse_log_level(&config.application.log_level)?;
    init(TracingConfig::new(level))
}

/// Initialize tracing with custom configuration.
///
/// Idempotent: a second initialization (common in tests) is a no-op.
pub fn init(config: TracingConfig) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let registry = tracing_subscriber::registry();
    let result = match config.format {
        OutputFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(env_filter),
            )
            .try_init(),
        OutputFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(env_filter),
            )
            .try_init(),
        OutputFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(env_filter),
            )
            .try_init(),
    };

    // try_init only fails when another dispatcher won the race to install
    // itself, which is the idempotent case.
    let _ = result;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_parse() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn init_is_idempotent() {
        assert!(init(TracingConfig::default()).is_ok());
        assert!(tracing::dispatcher::has_been_set());
        assert!(init(TracingConfig::new(Level::DEBUG)).is_ok());
    }
}
