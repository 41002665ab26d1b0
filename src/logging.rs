//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `level`
///
/// `level` accepts anything `EnvFilter` does (`info`,
/// `market_holdings_sdk=debug,reqwest=warn`, ...). `RUST_LOG` wins when set.
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()?;

    tracing::info!(level, "Logging initialized");
    Ok(())
}

/// Installs the subscriber described by a `[logging]` section
pub fn init_from_config(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&config.level)
}
