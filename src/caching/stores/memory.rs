//! # In-Memory Cache Store
//!
//! `DashMap`-backed store with TTL expiry measured against an injected clock,
//! and a cursor scan that pages through a sorted key snapshot the way Redis
//! `SCAN` walks its hash table: pages may be empty without the scan being over,
//! and keys written mid-scan may be missed or seen twice.

use super::{CacheEntry, CacheStore, ScanPage, SCAN_START};
use crate::caching::{CacheResult, GlobPattern};
use crate::core::clock::{system_clock, SharedClock};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InMemoryCacheConfig {
    /// Upper bound on keys examined per scan page, regardless of the caller's COUNT
    pub scan_page_size: Option<usize>,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self { scan_page_size: None }
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Configuration
    config: InMemoryCacheConfig,

    /// Cache entries storage
    entries: Arc<DashMap<String, CacheEntry>>,

    /// Time source for expiry
    clock: SharedClock,

    /// Number of SCAN calls served, for pagination assertions
    scan_calls: AtomicU64,

    /// Number of delete_many batches executed
    batch_deletes: AtomicU64,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    pub fn new(config: InMemoryCacheConfig, clock: SharedClock) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
            clock,
            scan_calls: AtomicU64::new(0),
            batch_deletes: AtomicU64::new(0),
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    pub fn batch_deletes(&self) -> u64 {
        self.batch_deletes.load(Ordering::Relaxed)
    }

    /// Drop expired entries
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    fn sorted_live_keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(InMemoryCacheConfig::default(), system_clock())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry::new(value.to_vec(), ttl, self.clock.now());
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage> {
        self.scan_calls.fetch_add(1, Ordering::Relaxed);

        let glob = GlobPattern::new(pattern)?;
        let page_size = self
            .config
            .scan_page_size
            .map_or(count, |limit| limit.min(count))
            .max(1);

        let keys = self.sorted_live_keys();
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(keys.len());
        let end = start.saturating_add(page_size).min(keys.len());

        let matched = keys[start..end]
            .iter()
            .filter(|key| glob.matches(key))
            .cloned()
            .collect();

        let next = if end >= keys.len() { SCAN_START } else { end as u64 };

        Ok(ScanPage {
            cursor: next,
            keys: matched,
        })
    }

    async fn delete_many(&self, keys: &[String]) -> CacheResult<usize> {
        self.batch_deletes.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }
}
