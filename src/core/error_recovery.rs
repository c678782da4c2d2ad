//! # Error Recovery Module
//!
//! Bounded retry with exponential backoff for single upstream calls.
//!
//! ## Strategy
//! - Attempt 1 runs immediately.
//! - Attempt `n` (n >= 2) runs after `base_delay * 2^(n-2)`: 1x, 2x, 4x, ...
//! - Only errors for which [`GatewayError::is_retryable`] holds are retried. A 4xx is
//!   returned after the first attempt without any delay.
//! - When every attempt fails, the last error is returned untouched so the caller still
//!   sees its classification.
//!
//! Jitter is off by default and, when enabled, adds up to 10% on top of each delay.

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for every further attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Add up to 10% random delay on top of the exponential schedule
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.max_attempts == 0 {
            return Err(GatewayError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Runs an operation with classified, bounded retry
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with the configured attempt budget and base delay
    pub async fn run<T, F, Fut>(&self, operation: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.run_with(operation, self.config.max_attempts, self.config.base_delay)
            .await
    }

    /// Run `operation` with an explicit attempt budget and base delay
    pub async fn run_with<T, F, Fut>(
        &self,
        mut operation: F,
        max_attempts: u32,
        base_delay: Duration,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    debug!("Not retrying {} error: {}", err.error_type(), err);
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    warn!("Giving up after {} attempts: {}", attempt, err);
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt, base_delay);
                    warn!(
                        "Attempt {} of {} failed ({}), retrying in {}ms",
                        attempt - 1,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    metrics::record_retry();
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before `attempt` (attempt numbers start at 1; attempt 1 has no delay)
    pub fn delay_for_attempt(&self, attempt: u32, base_delay: Duration) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2).min(31);
        let delay = base_delay.saturating_mul(1u32 << exponent);

        if self.config.jitter && !delay.is_zero() {
            let extra = delay.mul_f64(fastrand::f64() * 0.1);
            delay.saturating_add(extra)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryConfig::default())
    }

    #[test]
    fn test_backoff_schedule() {
        let retry = executor();
        let base = Duration::from_millis(100);
        assert_eq!(retry.delay_for_attempt(1, base), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(2, base), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(3, base), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(4, base), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let retry = RetryExecutor::new(RetryConfig {
            jitter: true,
            ..Default::default()
        });
        let base = Duration::from_millis(1000);
        for _ in 0..50 {
            let delay = retry.delay_for_attempt(3, base);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let attempts_at = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result = executor()
            .run_with(
                || {
                    let calls = Arc::clone(&calls);
                    let attempts_at = Arc::clone(&attempts_at);
                    async move {
                        attempts_at.lock().unwrap().push(start.elapsed());
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(GatewayError::from_status(503, Value::Null))
                        } else {
                            Ok("done")
                        }
                    }
                },
                3,
                Duration::from_millis(100),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let attempts_at = attempts_at.lock().unwrap().clone();
        let first_gap = attempts_at[1] - attempts_at[0];
        let second_gap = attempts_at[2] - attempts_at[1];
        assert!(first_gap >= Duration::from_millis(100));
        assert!(first_gap < Duration::from_millis(110));
        assert!(second_gap >= Duration::from_millis(200));
        assert!(second_gap < Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: GatewayResult<()> = executor()
            .run_with(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let detail = serde_json::json!({"message": "not found"});
                    async move { Err(GatewayError::from_status(404, detail)) }
                },
                3,
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Err(GatewayError::Client { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_surfaces_unchanged() {
        let calls = AtomicU32::new(0);

        let result: GatewayResult<()> = executor()
            .run_with(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(GatewayError::network("connection reset"))
                        } else {
                            Err(GatewayError::Timeout { timeout_ms: 250 })
                        }
                    }
                },
                3,
                Duration::from_millis(10),
            )
            .await;

        assert!(matches!(result, Err(GatewayError::Timeout { timeout_ms: 250 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<()> = executor()
            .run_with(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(GatewayError::from_status(500, Value::Null)) }
                },
                1,
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Err(GatewayError::Server { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
