//! # Observability Module
//!
//! Structured logging through `tracing` and counters/histograms through the `metrics`
//! facade, with an optional Prometheus exporter.

// Logging and metrics configuration
pub mod config;

// Metric names and recording helpers
pub mod metrics;

// Structured logging
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{LogConfig, LogFormat, MetricsConfig};
pub use logging::init_logging;
