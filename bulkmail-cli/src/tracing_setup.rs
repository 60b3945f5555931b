//! Tracing setup for the bulkmail binary
//!
//! Usage:
//!   bulkmail --debug serve               # Debug logging to console
//!   bulkmail --log-format json serve     # One JSON object per line
//!   RUST_LOG=bulkmail_server=debug bulkmail serve
//!
//! Environment variables:
//!   RUST_LOG                             # Log filter (default: info)

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Console output format
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Compact,
    /// Newline-delimited JSON for log shippers
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Enable debug logging (used when RUST_LOG is not set)
    pub debug: bool,
    pub format: LogFormat,
}

fn filter(config: &TracingConfig) -> EnvFilter {
    let default_level = if config.debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the global subscriber.
pub fn init(config: &TracingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(config.debug);

    match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|err| anyhow!(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_error() {
        let config = TracingConfig::default();
        let _ = init(&config);

        let err = init(&config).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn debug_flag_sets_default_level() {
        let config = TracingConfig {
            debug: true,
            ..TracingConfig::default()
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter(&config).to_string(), "debug");
        }
    }
}
