//! # Caching System Module
//!
//! Read-through cache that sits in front of the document store. Values are
//! serialized to JSON and stored with a TTL; writers invalidate single keys or
//! whole key families after their write commits.
//!
//! ## Features
//! - `get_or_populate` read-through with TTL expiry
//! - Single-key invalidation and glob pattern invalidation over cursor scans
//! - Redis-backed store for production, in-memory store for tests and local runs
//! - Namespaced key builders shared by every reader and writer
//!
//! ## Architecture
//! 1. **Cache Manager**: the façade callers use (`get_or_populate`, `invalidate`, `invalidate_pattern`)
//! 2. **Cache Stores**: the `GET` / `SET EX` / `SCAN` / `DEL` protocol, Redis or in-memory
//! 3. **Keys**: `<entityType>:<id>` and `<entityType>:<id>:<subresource>:page:<n>` builders
//! 4. **Invalidation**: scan accumulation and batched deletion
//!
//! ## Usage Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use plantpulse_core::caching::{keys, CacheConfig, CacheManager, InMemoryCache};
//!
//! let cache = CacheManager::new(Arc::new(InMemoryCache::default()), CacheConfig::default());
//!
//! let plant_type = cache
//!     .get_or_populate(&keys::plant_type("42"), Duration::from_secs(3600), || async {
//!         store.plant_type("42").await
//!     })
//!     .await?;
//!
//! // after the write commits
//! cache.invalidate_pattern(keys::PLANT_TYPE_PAGES).await;
//! ```
//!
//! ## Concurrency caveat
//! Concurrent misses on the same key each run their populate function
//! (cache stampede). Population is not serialized; the redundant backend
//! reads are accepted.

pub mod cache_manager;
pub mod invalidation;
pub mod keys;
pub mod pattern;
pub mod stores;

pub use cache_manager::{CacheConfig, CacheManager, CacheStats};
pub use invalidation::collect_matching_keys;
pub use pattern::GlobPattern;
pub use stores::{
    CacheEntry, CacheStore, InMemoryCache, InMemoryCacheConfig, RedisCache, RedisCacheConfig,
    ScanPage, SCAN_START,
};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid cache key: {message}")]
    InvalidKey { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}

impl CacheError {
    /// Errors caused by the store being unreachable rather than by the request
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Redis(err) => err.is_io_error() || err.is_connection_dropped() || err.is_timeout(),
            Self::Timeout | Self::Unavailable => true,
            _ => false,
        }
    }
}
