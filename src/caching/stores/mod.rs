//! # Cache Stores Module
//!
//! Storage backends for cached upstream payloads. The gateway only ships the in-memory
//! store; all cached state is volatile and can be rebuilt from the upstream.

pub mod memory;

pub use memory::{InMemoryCache, InMemoryCacheConfig};

use crate::core::types::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload
    pub value: Payload,

    /// When the entry was inserted
    pub inserted_at: Instant,

    /// How long the entry stays fresh
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Payload, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// An entry is stale once `now - inserted_at >= ttl`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Age of the entry
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// Time left before the entry expires
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }
}

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a fresh value; expired entries are reported as absent
    async fn get(&self, key: &str) -> Option<Payload>;

    /// Insert or overwrite a value with the given TTL
    async fn set(&self, key: &str, value: Payload, ttl: Duration);

    /// Delete one key, returning whether it existed
    async fn delete(&self, key: &str) -> bool;

    /// Delete every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> usize;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> usize;

    /// Keys of all fresh entries
    async fn keys(&self) -> Vec<String>;

    /// Remove expired entries, returning how many were removed
    async fn purge_expired(&self) -> usize;

    /// Get cache statistics
    async fn stats(&self) -> CacheStoreStats;

    /// Check whether the store is able to serve requests
    async fn health_check(&self) -> bool;
}

/// Cache store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStoreStats {
    /// Number of stored entries, fresh or not yet swept
    pub entries: usize,

    /// Number of hits
    pub hits: u64,

    /// Number of misses
    pub misses: u64,

    /// Number of expired entries removed lazily or by the sweeper
    pub expired: u64,
}
