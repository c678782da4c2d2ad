//! # Metrics
//!
//! Metric names and small recording helpers over the `metrics` facade. Without an
//! installed recorder every call is a no-op, so the core records unconditionally and
//! the binary decides whether to export.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `crm_gateway_cache_lookups_total` | counter | `outcome` = hit / miss / bypass |
//! | `crm_gateway_upstream_requests_total` | counter | `outcome` = success / client_error / ... |
//! | `crm_gateway_upstream_latency_seconds` | histogram | |
//! | `crm_gateway_retries_total` | counter | |
//! | `crm_gateway_admission_wait_seconds` | histogram | |
//! | `crm_gateway_inflight_coalesced_total` | counter | |
//! | `crm_gateway_warmup_records_total` | counter | `entity` |

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::config::MetricsConfig;
use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tracing::info;

pub const CACHE_LOOKUPS: &str = "crm_gateway_cache_lookups_total";
pub const UPSTREAM_REQUESTS: &str = "crm_gateway_upstream_requests_total";
pub const UPSTREAM_LATENCY: &str = "crm_gateway_upstream_latency_seconds";
pub const RETRIES: &str = "crm_gateway_retries_total";
pub const ADMISSION_WAIT: &str = "crm_gateway_admission_wait_seconds";
pub const INFLIGHT_COALESCED: &str = "crm_gateway_inflight_coalesced_total";
pub const WARMUP_RECORDS: &str = "crm_gateway_warmup_records_total";

pub fn record_cache_lookup(outcome: &'static str) {
    counter!(CACHE_LOOKUPS, "outcome" => outcome).increment(1);
}

pub fn record_upstream_result<T>(result: &GatewayResult<T>, elapsed: Duration) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => err.error_type(),
    };
    counter!(UPSTREAM_REQUESTS, "outcome" => outcome).increment(1);
    histogram!(UPSTREAM_LATENCY).record(elapsed.as_secs_f64());
}

pub fn record_retry() {
    counter!(RETRIES).increment(1);
}

pub fn record_admission_wait(waited: Duration) {
    histogram!(ADMISSION_WAIT).record(waited.as_secs_f64());
}

pub fn record_coalesced() {
    counter!(INFLIGHT_COALESCED).increment(1);
}

pub fn record_warmup_records(entity: &str, records: usize) {
    counter!(WARMUP_RECORDS, "entity" => entity.to_string()).increment(records as u64);
}

/// Register descriptions for every metric the gateway emits
pub fn describe_metrics() {
    describe_counter!(CACHE_LOOKUPS, "Cache lookups by outcome");
    describe_counter!(UPSTREAM_REQUESTS, "Upstream attempts by outcome");
    describe_histogram!(UPSTREAM_LATENCY, Unit::Seconds, "Latency of upstream attempts");
    describe_counter!(RETRIES, "Upstream attempts that were retried");
    describe_histogram!(ADMISSION_WAIT, Unit::Seconds, "Time spent waiting for an admission slot");
    describe_counter!(INFLIGHT_COALESCED, "Reads served by joining an in-flight request");
    describe_counter!(WARMUP_RECORDS, "Records loaded by cache warm-up");
}

/// Install the Prometheus exporter when enabled
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(config: &MetricsConfig) -> GatewayResult<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen_address)
        .install()
        .map_err(|e| GatewayError::config(format!("Failed to install metrics exporter: {}", e)))?;

    describe_metrics();
    info!("Prometheus exporter listening on {}", config.listen_address);
    Ok(())
}
