//! # Cache Stores Module
//!
//! The key-value protocol the cache façade speaks: `GET`, `SET key value EX ttl`,
//! `SCAN cursor MATCH pattern COUNT n`, and `DEL key...`, with a Redis and an
//! in-memory implementation.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::CacheResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Cursor that starts a scan and, when returned by the store, ends it
pub const SCAN_START: u64 = 0;

/// One page of a cursor-based key scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; `SCAN_START` when the scan is complete
    pub cursor: u64,

    /// Keys matching the pattern on this page. May repeat keys already seen.
    pub keys: Vec<String>,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.cursor == SCAN_START
    }
}

/// Cache entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: Vec<u8>,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new cache entry expiring `ttl` after `now`
    pub fn new(value: Vec<u8>, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        Self {
            value,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Check if the entry is expired. An entry is never served at or past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time until expiration
    pub fn ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `GET key`. Expired and absent keys both yield `None`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// `SET key value EX ttl`
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// `DEL key`. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// `SCAN cursor MATCH pattern COUNT count`
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage>;

    /// Delete every key in one pipelined operation. Returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> CacheResult<usize>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;
}
