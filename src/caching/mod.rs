//! # Caching System Module
//!
//! Response caching for CRM reads.
//!
//! ## Architecture
//! 1. **Cache Manager**: policy-aware front door with default TTL and statistics
//! 2. **Cache Stores**: the `CacheStore` trait and its in-memory implementation
//! 3. **Key Generator**: canonical keys shared by typed and raw requests
//! 4. **Policy**: per-entity `Disabled` / `TimedTtl` resolution
//! 5. **Deduplication**: single-flight collapsing of identical concurrent reads
//! 6. **Warmer**: paginated preloading and periodic refresh
//! 7. **Admin Interface**: management endpoints for cache operations

pub mod admin;
pub mod cache_manager;
pub mod deduplication;
pub mod key_generator;
pub mod policy;
pub mod stores;
pub mod warmer;

pub use admin::{CacheAdminRouter, CacheAdminState};
pub use cache_manager::{CacheConfig, CacheManager, CacheStats};
pub use deduplication::{InFlightRegistry, InFlightStats};
pub use key_generator::{CacheKey, OperationKind};
pub use policy::{CacheMode, EntityCachePolicy, PolicySnapshot};
pub use stores::{CacheEntry, CacheStore, InMemoryCache};
pub use warmer::{CacheWarmer, WarmUpOutcome, WarmUpReport, WarmupConfig};
