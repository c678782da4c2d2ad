//! # Upstream Dispatcher
//!
//! Wraps the upstream client with the traffic controls every live call goes through:
//! admission once per logical call, then the retry executor around attempts that each
//! carry their own deadline. Latency and outcome of every attempt are recorded.

use super::client::UpstreamClient;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::error_recovery::RetryExecutor;
use crate::core::types::{params, UpstreamRequest};
use crate::observability::metrics;
use crate::traffic::admission::AdmissionController;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Records collected by a paginated fetch
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRecords {
    pub records: Vec<Value>,
    /// Total reported by the upstream on the last page, if any
    pub total: Option<u64>,
    pub pages: u32,
}

impl PagedRecords {
    /// The `{list, total}` collection shape served for a list-all read
    pub fn into_collection(self) -> Value {
        let total = self.total.unwrap_or(self.records.len() as u64);
        json!({ "list": self.records, "total": total })
    }
}

/// Executes upstream calls under admission, retry and timeout
pub struct UpstreamDispatcher {
    client: Arc<dyn UpstreamClient>,
    admission: Arc<AdmissionController>,
    retry: RetryExecutor,
    attempt_timeout: Duration,
}

impl UpstreamDispatcher {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        admission: Arc<AdmissionController>,
        retry: RetryExecutor,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            client,
            admission,
            retry,
            attempt_timeout,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Perform one logical call
    ///
    /// With `admit` set the call takes one admission slot before its first attempt;
    /// retries of the same call do not take further slots.
    pub async fn dispatch(&self, request: &UpstreamRequest, admit: bool) -> GatewayResult<Value> {
        if admit {
            self.admission.acquire_slot().await;
        }

        self.retry.run(|| self.attempt(request)).await
    }

    async fn attempt(&self, request: &UpstreamRequest) -> GatewayResult<Value> {
        let started = Instant::now();

        let result = match timeout(self.attempt_timeout, self.client.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Upstream {} timed out after {}ms",
                    request,
                    self.attempt_timeout.as_millis()
                );
                Err(GatewayError::timeout(self.attempt_timeout))
            }
        };

        metrics::record_upstream_result(&result, started.elapsed());
        result
    }

    /// Page through a collection until it is exhausted or `max_records` are collected
    ///
    /// Each page is its own logical call. Paging stops on a short page, when the
    /// upstream total is reached, or at the record cap.
    pub async fn fetch_all_pages(
        &self,
        request: &UpstreamRequest,
        page_size: u32,
        max_records: usize,
        admit: bool,
    ) -> GatewayResult<PagedRecords> {
        let page_size = page_size.max(1) as usize;
        let mut records: Vec<Value> = Vec::new();
        let mut total = None;
        let mut pages = 0u32;

        while records.len() < max_records {
            let requested = page_size.min(max_records - records.len());
            let page_request = request
                .clone()
                .with_query(params::MAX_SIZE, requested.to_string())
                .with_query(params::OFFSET, records.len().to_string());

            let body = self.dispatch(&page_request, admit).await?;
            let (page, page_total) = split_collection(body, request)?;
            pages += 1;

            let received = page.len();
            total = page_total.or(total);
            records.extend(page.into_iter().take(max_records - records.len()));

            debug!(
                "Fetched page {} of {} ({} records, {} so far)",
                pages,
                request.path,
                received,
                records.len()
            );

            if received < requested {
                break;
            }
            if total.is_some_and(|total| records.len() as u64 >= total) {
                break;
            }
        }

        Ok(PagedRecords {
            records,
            total,
            pages,
        })
    }
}

/// Split a `{list: [...], total: N}` body into its records and total
fn split_collection(
    body: Value,
    request: &UpstreamRequest,
) -> GatewayResult<(Vec<Value>, Option<u64>)> {
    let Value::Object(mut body) = body else {
        return Err(GatewayError::Decode {
            message: format!("{} did not return a collection", request.path),
        });
    };

    let total = body.get("total").and_then(Value::as_u64);
    match body.remove("list") {
        Some(Value::Array(list)) => Ok((list, total)),
        _ => Err(GatewayError::Decode {
            message: format!("{} returned a collection without a list", request.path),
        }),
    }
}
