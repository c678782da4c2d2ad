//! # In-Memory Cache Store
//!
//! `DashMap`-backed store with lazy expiry on read and a background sweeper that
//! reclaims memory held by expired entries. The sweeper is only an optimization;
//! freshness is enforced by the read path.

use super::{CacheEntry, CacheStore, CacheStoreStats};
use crate::core::types::Payload;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCacheConfig {
    /// Interval of the background sweep for expired entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
        }
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Cache entries storage
    entries: Arc<DashMap<String, CacheEntry>>,

    hits: AtomicU64,
    misses: AtomicU64,
    expired: Arc<AtomicU64>,

    /// Sweeper task handle, aborted on drop
    sweeper: JoinHandle<()>,
}

impl InMemoryCache {
    /// Create a new in-memory cache and start its sweeper
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: InMemoryCacheConfig) -> Self {
        let entries = Arc::new(DashMap::new());
        let expired = Arc::new(AtomicU64::new(0));

        let sweeper = {
            let entries = Arc::clone(&entries);
            let expired = Arc::clone(&expired);
            let period = config.sweep_interval.max(Duration::from_millis(1));

            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let removed = Self::sweep(&entries);
                    if removed > 0 {
                        expired.fetch_add(removed as u64, Ordering::Relaxed);
                        debug!("Swept {} expired cache entries", removed);
                    }
                }
            })
        };

        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired,
            sweeper,
        }
    }

    fn sweep(entries: &DashMap<String, CacheEntry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Payload> {
        let now = Instant::now();

        let fresh = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Some(Arc::clone(&entry.value)),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                // Only drop the entry if it is still the stale one we saw
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired_at(now))
                    .is_some()
                {
                    self.expired.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) {
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    async fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    async fn purge_expired(&self) -> usize {
        let removed = Self::sweep(&self.entries);
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    async fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    async fn health_check(&self) -> bool {
        !self.sweeper.is_finished()
    }
}
