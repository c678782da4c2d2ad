//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: a `fmt` layer in JSON or pretty form,
//! filtered by `RUST_LOG` when present and by the configured level otherwise.

use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Build the filter used by the subscriber
pub fn build_filter(config: &LogConfig) -> GatewayResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            GatewayError::config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Initialize the global subscriber
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(config: &LogConfig) -> GatewayResult<()> {
    let filter = build_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}
