//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` (RUST_LOG wins over
//! the configured level) feeding either a JSON or a human readable fmt layer.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{ProxyError, ProxyResult};

/// Build the filter from RUST_LOG, falling back to the configured directive
pub fn build_filter(config: &LoggingConfig) -> ProxyResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ProxyError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize the global subscriber.
///
/// Calling this twice is harmless: the second install is skipped with a warning.
pub fn init_logging(config: &LoggingConfig) -> ProxyResult<()> {
    let env_filter = build_filter(config)?;

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(level = %config.level, format = ?config.format, "Structured logging initialized");
    Ok(())
}
