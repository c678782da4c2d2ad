//! # Cache Manager
//!
//! Front door to the response cache. Applies the per-entity cache policy on every
//! lookup and store, fills in the default TTL and keeps the statistics the admin
//! surface reports.
//!
//! Every entity carries an invalidation generation that moves whenever its cached reads
//! are dropped. A read captures the generation before going upstream and stores with
//! [`CacheManager::set_if_current`], so a payload fetched before a write never lands in
//! the cache after that write's invalidation.

use super::key_generator::CacheKey;
use super::policy::EntityCachePolicy;
use super::stores::{CacheStore, InMemoryCache, InMemoryCacheConfig};
use crate::core::types::Payload;
use crate::observability::metrics;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller does not supply one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Interval of the background sweep for expired entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Entities that are never cached
    pub no_cache: Vec<String>,

    /// When non-empty, only these entities are cached
    pub cache_only: Vec<String>,

    /// Collapse concurrent identical reads into one upstream call
    pub deduplicate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(600),
            no_cache: Vec::new(),
            cache_only: Vec::new(),
            deduplicate: true,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    /// Entries currently stored
    pub count: usize,

    /// Lookups answered from the cache
    pub hits: u64,

    /// Lookups of cacheable entities that found nothing fresh
    pub misses: u64,

    /// Lookups skipped because the entity's policy is disabled
    pub bypassed: u64,

    /// Entries removed because their TTL elapsed
    pub expired: u64,

    /// hits / (hits + misses)
    pub hit_ratio: f64,

    /// Default TTL in seconds
    pub default_ttl_secs: u64,
}

/// Policy-aware response cache
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    policy: Arc<EntityCachePolicy>,
    bypassed: AtomicU64,
    invalidations: DashMap<String, u64>,
    flushes: AtomicU64,
}

impl CacheManager {
    /// Create a cache manager backed by the in-memory store
    ///
    /// Must be called from within a Tokio runtime (the store starts its sweeper).
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig {
            sweep_interval: config.sweep_interval,
        }));
        let policy = Arc::new(EntityCachePolicy::new(
            config.no_cache.iter().cloned(),
            config.cache_only.iter().cloned(),
        ));

        info!(
            "Cache initialized with default TTL {:?}, sweep every {:?}",
            config.default_ttl, config.sweep_interval
        );

        Self::with_store(config, store, policy)
    }

    pub fn with_store(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        policy: Arc<EntityCachePolicy>,
    ) -> Self {
        Self {
            config,
            store,
            policy,
            bypassed: AtomicU64::new(0),
            invalidations: DashMap::new(),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<EntityCachePolicy> {
        &self.policy
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    pub fn is_cacheable(&self, entity: &str) -> bool {
        self.policy.is_cacheable(entity)
    }

    /// Look up a fresh payload; disabled entities always report absent
    pub async fn get(&self, key: &CacheKey) -> Option<Payload> {
        if !self.policy.is_cacheable(key.entity()) {
            self.bypassed.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_lookup("bypass");
            return None;
        }

        let value = self.store.get(key.as_str()).await;
        if value.is_some() {
            debug!("Cache hit for key: {}", key);
            metrics::record_cache_lookup("hit");
        } else {
            debug!("Cache miss for key: {}", key);
            metrics::record_cache_lookup("miss");
        }
        value
    }

    /// Store a payload; a no-op for disabled entities
    ///
    /// Returns whether the payload was stored.
    pub async fn set(&self, key: &CacheKey, value: Payload, ttl: Option<Duration>) -> bool {
        if !self.policy.is_cacheable(key.entity()) {
            return false;
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.store.set(key.as_str(), value, ttl).await;
        debug!("Cached key: {} with TTL: {:?}", key, ttl);
        true
    }

    /// Invalidation generation of `entity`
    pub fn generation(&self, entity: &str) -> u64 {
        let entity_generation = self.invalidations.get(entity).map_or(0, |g| *g);
        self.flushes.load(Ordering::SeqCst) + entity_generation
    }

    /// Store a payload fetched while the entity was at `generation`
    ///
    /// Discards the payload if the entity was invalidated since. Returns whether the
    /// payload was stored.
    pub async fn set_if_current(
        &self,
        key: &CacheKey,
        value: Payload,
        ttl: Option<Duration>,
        generation: u64,
    ) -> bool {
        if self.generation(key.entity()) != generation {
            debug!("Discarding stale payload for key: {}", key);
            return false;
        }
        if !self.set(key, value, ttl).await {
            return false;
        }

        // An invalidation may have landed between the check and the store
        if self.generation(key.entity()) != generation {
            self.store.delete(key.as_str()).await;
            debug!("Discarding stale payload for key: {}", key);
            return false;
        }
        true
    }

    /// Delete one key
    pub async fn delete(&self, key: &str) -> bool {
        let deleted = self.store.delete(key).await;
        if deleted {
            debug!("Deleted cache key: {}", key);
        }
        deleted
    }

    /// Delete every key belonging to `entity`
    pub async fn delete_by_entity(&self, entity: &str) -> usize {
        *self.invalidations.entry(entity.to_string()).or_insert(0) += 1;
        let removed = self.store.delete_prefix(&CacheKey::entity_prefix(entity)).await;
        info!("Invalidated {} cache entries for entity {}", removed, entity);
        removed
    }

    /// Remove everything
    pub async fn flush_all(&self) -> usize {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.clear().await;
        info!("Flushed {} cache entries", removed);
        removed
    }

    /// Keys of all fresh entries
    pub async fn keys(&self) -> Vec<String> {
        self.store.keys().await
    }

    /// Remove expired entries now instead of waiting for the sweeper
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }

    pub async fn health_check(&self) -> bool {
        let healthy = self.store.health_check().await;
        if !healthy {
            warn!("Cache store health check failed");
        }
        healthy
    }

    pub async fn stats(&self) -> CacheStats {
        let store_stats = self.store.stats().await;
        let lookups = store_stats.hits + store_stats.misses;

        CacheStats {
            count: store_stats.entries,
            hits: store_stats.hits,
            misses: store_stats.misses,
            bypassed: self.bypassed.load(Ordering::Relaxed),
            expired: store_stats.expired,
            hit_ratio: if lookups > 0 {
                store_stats.hits as f64 / lookups as f64
            } else {
                0.0
            },
            default_ttl_secs: self.config.default_ttl.as_secs(),
        }
    }
}
