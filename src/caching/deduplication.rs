//! # Request Deduplication Module
//!
//! Single-flight collapsing of identical concurrent reads.
//!
//! The first caller for a key becomes the leader: its factory future is spawned onto
//! the runtime and the task's outcome is made [`Shared`] and registered under the key.
//! Every caller that arrives while the entry exists awaits a clone of that shared
//! outcome instead of starting its own work, so the factory runs once and all joiners
//! observe the same outcome, value or error.
//!
//! The work does not depend on any caller being polled. A leader that times out or is
//! dropped leaves the task running, and the task removes its own entry as soon as the
//! work settles, before any joiner sees the outcome. A caller arriving after that
//! starts a fresh cycle. Entries carry a generation id so a settling call never removes
//! a newer entry for the same key.

use crate::observability::metrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedOutcome<T> = Shared<BoxFuture<'static, T>>;
type CallMap<T> = Arc<Mutex<HashMap<String, InFlightCall<T>>>>;

struct InFlightCall<T> {
    generation: u64,
    outcome: SharedOutcome<T>,
    /// Callers awaiting this call, leader included
    subscribers: usize,
}

/// Removes the entry of one generation when the leader's task ends, even on panic
struct EntryGuard<T> {
    calls: CallMap<T>,
    key: String,
    generation: u64,
}

impl<T> Drop for EntryGuard<T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        if calls
            .get(&self.key)
            .is_some_and(|call| call.generation == self.generation)
        {
            calls.remove(&self.key);
        }
    }
}

/// Counts one caller out when it stops waiting, whether it got the outcome or not
struct Subscription<T> {
    calls: CallMap<T>,
    key: String,
    generation: u64,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        if let Some(call) = calls
            .get_mut(&self.key)
            .filter(|call| call.generation == self.generation)
        {
            call.subscribers = call.subscribers.saturating_sub(1);
        }
    }
}

/// Single-flight statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InFlightStats {
    pub enabled: bool,
    /// Calls currently running
    pub in_flight: usize,
    /// Calls that ran their own factory
    pub leaders: u64,
    /// Calls served by joining another caller's work
    pub coalesced: u64,
}

/// Registry of in-flight calls keyed by cache key
pub struct InFlightRegistry<T> {
    enabled: bool,
    calls: CallMap<T>,
    next_generation: AtomicU64,
    leaders: AtomicU64,
    coalesced: AtomicU64,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A disabled registry runs every caller's factory
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            calls: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            leaders: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run `factory` for `key` unless an identical call is already running
    ///
    /// `factory` is only invoked by the leader, and the future it returns is spawned,
    /// so it must own everything it needs. Must be called from within a Tokio runtime.
    pub async fn join<F, Fut>(&self, key: &str, factory: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        if !self.enabled {
            self.leaders.fetch_add(1, Ordering::Relaxed);
            return factory().await;
        }

        let (outcome, generation) = {
            let mut calls = self.calls.lock();
            match calls.get_mut(key) {
                Some(call) => {
                    call.subscribers += 1;
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    metrics::record_coalesced();
                    debug!("Joining in-flight request for key: {}", key);
                    (call.outcome.clone(), call.generation)
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let outcome = Self::spawn_leader(
                        Arc::clone(&self.calls),
                        key.to_string(),
                        generation,
                        factory(),
                    );
                    calls.insert(
                        key.to_string(),
                        InFlightCall {
                            generation,
                            outcome: outcome.clone(),
                            subscribers: 1,
                        },
                    );
                    self.leaders.fetch_add(1, Ordering::Relaxed);
                    (outcome, generation)
                }
            }
        };

        let _subscription = Subscription {
            calls: Arc::clone(&self.calls),
            key: key.to_string(),
            generation,
        };
        outcome.await
    }

    fn spawn_leader<Fut>(
        calls: CallMap<T>,
        key: String,
        generation: u64,
        work: Fut,
    ) -> SharedOutcome<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let entry = EntryGuard {
                calls,
                key,
                generation,
            };
            let outcome = work.await;
            drop(entry);
            outcome
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
                // Only runtime shutdown cancels the task
                Err(_) => futures::future::pending().await,
            }
        }
        .boxed()
        .shared()
    }

    /// Number of calls currently running
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Callers currently waiting on `key`, if a call for it is running
    pub fn subscribers(&self, key: &str) -> Option<usize> {
        self.calls.lock().get(key).map(|call| call.subscribers)
    }

    pub fn stats(&self) -> InFlightStats {
        InFlightStats {
            enabled: self.enabled,
            in_flight: self.in_flight(),
            leaders: self.leaders.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}
