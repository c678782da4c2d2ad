//! # Admission Control
//!
//! Sliding-window limiter for outbound upstream requests.
//!
//! The controller remembers the instant of every admission inside the trailing window.
//! A caller is admitted when fewer than `max_requests` admissions fall inside the
//! window ending now; otherwise it sleeps until the oldest admission leaves the window
//! and checks again. Pruning, checking and recording happen under one lock, so two
//! waiters can never both take the last slot.

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Admission limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum admissions within any window
    pub max_requests: u32,

    /// Length of the sliding window
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Also throttle requests for entities whose cache policy is disabled
    pub limit_uncached: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            limit_uncached: false,
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.max_requests == 0 {
            return Err(GatewayError::config("admission.max_requests must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(GatewayError::config("admission.window must be greater than zero"));
        }
        Ok(())
    }
}

/// Admission statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdmissionStats {
    pub max_requests: u32,
    pub window_ms: u64,
    /// Admissions inside the current window
    pub in_window: usize,
    /// Admissions granted since start
    pub admitted: u64,
    /// Times a caller had to sleep before being admitted
    pub waits: u64,
}

/// Outcome of a non-blocking admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Retry after this long
    Denied(Duration),
}

/// Sliding-window admission controller
#[derive(Debug)]
pub struct AdmissionController {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    admitted: AtomicU64,
    waits: AtomicU64,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            max_requests: config.max_requests.max(1) as usize,
            window: config.window,
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
            admitted: AtomicU64::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// Admit one request, suspending until the window has room
    pub async fn acquire_slot(&self) {
        let started = Instant::now();
        let mut waited = false;

        loop {
            match self.try_acquire() {
                Admission::Granted => break,
                Admission::Denied(wait) => {
                    if !waited {
                        self.waits.fetch_add(1, Ordering::Relaxed);
                        waited = true;
                    }
                    debug!("Admission window full, waiting {:?}", wait);
                    sleep(wait).await;
                }
            }
        }

        if waited {
            metrics::record_admission_wait(started.elapsed());
        }
    }

    /// Admit one request if the window has room, without waiting
    pub fn try_acquire(&self) -> Admission {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();

        Self::prune(&mut timestamps, now, self.window);

        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Admission::Granted;
        }

        // The window is full, so there is an oldest admission
        let oldest = timestamps.front().copied().unwrap_or(now);
        let wait = self
            .window
            .saturating_sub(now.saturating_duration_since(oldest))
            .max(Duration::from_millis(1));
        Admission::Denied(wait)
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admissions inside the current window
    pub fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock();
        Self::prune(&mut timestamps, Instant::now(), self.window);
        timestamps.len()
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            max_requests: self.max_requests as u32,
            window_ms: self.window.as_millis() as u64,
            in_window: self.in_window(),
            admitted: self.admitted.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}
