//! # Entity Cache Policy
//!
//! Decides per entity whether responses may be cached.
//!
//! Resolution order:
//! 1. An entity on the no-cache list is never cached.
//! 2. If the cache-only list is non-empty, only entities on it are cached.
//! 3. Otherwise every entity is cached with a timed TTL.
//!
//! The decision is made on every request and never memoized, so replacing the lists at
//! runtime takes effect immediately.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// How an entity's responses are treated by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Always served live
    Disabled,
    /// Cached until the entry's TTL elapses
    TimedTtl,
}

#[derive(Debug, Default, Clone, Serialize)]
struct PolicyLists {
    no_cache: HashSet<String>,
    cache_only: HashSet<String>,
}

/// Per-entity cache policy resolver
#[derive(Debug, Default)]
pub struct EntityCachePolicy {
    lists: RwLock<PolicyLists>,
}

/// Snapshot of the configured lists, for the admin surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub no_cache: Vec<String>,
    pub cache_only: Vec<String>,
}

impl EntityCachePolicy {
    pub fn new<I, J>(no_cache: I, cache_only: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            lists: RwLock::new(PolicyLists {
                no_cache: no_cache.into_iter().collect(),
                cache_only: cache_only.into_iter().collect(),
            }),
        }
    }

    /// Resolve the cache mode of `entity`
    pub fn resolve(&self, entity: &str) -> CacheMode {
        let lists = self.lists.read();

        if lists.no_cache.contains(entity) {
            return CacheMode::Disabled;
        }
        if !lists.cache_only.is_empty() && !lists.cache_only.contains(entity) {
            return CacheMode::Disabled;
        }
        CacheMode::TimedTtl
    }

    pub fn is_cacheable(&self, entity: &str) -> bool {
        self.resolve(entity) == CacheMode::TimedTtl
    }

    /// Replace both lists atomically
    pub fn replace_lists<I, J>(&self, no_cache: I, cache_only: J)
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let new_lists = PolicyLists {
            no_cache: no_cache.into_iter().collect(),
            cache_only: cache_only.into_iter().collect(),
        };
        info!(
            "Cache policy updated: {} no-cache, {} cache-only entities",
            new_lists.no_cache.len(),
            new_lists.cache_only.len()
        );
        *self.lists.write() = new_lists;
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        let lists = self.lists.read();
        let mut no_cache: Vec<String> = lists.no_cache.iter().cloned().collect();
        let mut cache_only: Vec<String> = lists.cache_only.iter().cloned().collect();
        no_cache.sort();
        cache_only.sort();
        PolicySnapshot { no_cache, cache_only }
    }
}
