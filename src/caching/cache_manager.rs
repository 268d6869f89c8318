//! # Cache Manager
//!
//! The read-through façade over a [`CacheStore`]. Callers hand it a key, a TTL
//! and a populate function; the manager answers from the store on a hit and
//! runs the populate function on a miss, caching only successful results.
//!
//! The store is a best-effort accelerator: a failing store degrades reads to
//! misses and turns invalidations into logged no-ops. Only populate failures
//! ever reach the caller.

use super::invalidation::delete_matching;
use super::{keys, CacheResult, CacheStore};
use crate::observability::metrics::{CACHE_HITS_TOTAL, CACHE_INVALIDATIONS_TOTAL, CACHE_MISSES_TOTAL};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Default TTL for cached items
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// COUNT hint passed to each SCAN call during pattern invalidation
    pub scan_count: usize,

    /// Enable cache statistics
    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            scan_count: 100,
            enable_stats: true,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Reads answered from the store
    pub hits: u64,

    /// Reads that fell through to the populate function
    pub misses: u64,

    /// Populated values written back to the store
    pub populates: u64,

    /// Populate functions that returned an error
    pub populate_failures: u64,

    /// Keys removed by single-key or pattern invalidation
    pub invalidations: u64,

    /// Invalidation calls that failed and were swallowed
    pub invalidation_failures: u64,

    /// hits / (hits + misses)
    pub hit_ratio: f64,
}

#[derive(Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    populates: AtomicU64,
    populate_failures: AtomicU64,
    invalidations: AtomicU64,
    invalidation_failures: AtomicU64,
}

/// Read-through cache manager
pub struct CacheManager {
    /// Configuration
    config: CacheConfig,

    /// Backing key-value store
    store: Arc<dyn CacheStore>,

    /// Cache statistics
    stats: StatsCounters,
}

impl CacheManager {
    /// Create a new cache manager over `store`
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        info!(
            default_ttl = ?config.default_ttl,
            scan_count = config.scan_count,
            "Cache manager initialized"
        );

        Self {
            config,
            store,
            stats: StatsCounters::default(),
        }
    }

    /// Get cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the cached value for `key`, or run `populate`, cache its result
    /// for `ttl` and return it.
    ///
    /// A populate error is returned as-is and nothing is cached. Concurrent
    /// misses on the same key each run `populate`.
    pub async fn get_or_populate<T, E, F, Fut>(&self, key: &str, ttl: Duration, populate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup::<T>(key).await {
            self.record_hit(key);
            return Ok(value);
        }
        self.record_miss(key);

        let value = match populate().await {
            Ok(value) => value,
            Err(e) => {
                if self.config.enable_stats {
                    self.stats.populate_failures.fetch_add(1, Ordering::Relaxed);
                }
                debug!(key, "Populate failed, nothing cached");
                return Err(e);
            }
        };

        self.write_back(key, &value, ttl).await;
        Ok(value)
    }

    /// [`get_or_populate`](Self::get_or_populate) with the configured default TTL
    pub async fn cached<T, E, F, Fut>(&self, key: &str, populate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_populate(key, self.config.default_ttl, populate).await
    }

    /// Remove one key. Missing keys and store failures are not errors.
    pub async fn invalidate(&self, key: &str) {
        match self.store.delete(key).await {
            Ok(removed) => {
                if removed {
                    self.record_invalidations(key, 1);
                }
                debug!(key, removed, "Invalidated cache key");
            }
            Err(e) => {
                if self.config.enable_stats {
                    self.stats.invalidation_failures.fetch_add(1, Ordering::Relaxed);
                }
                warn!(key, error = %e, "Cache invalidation failed, entry may be served until TTL expiry");
            }
        }
    }

    /// Remove every key matching `pattern`, surfacing store errors
    pub async fn try_invalidate_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let removed = delete_matching(self.store.as_ref(), pattern, self.config.scan_count).await?;
        self.record_invalidations(pattern, removed);
        debug!(pattern, removed, "Invalidated cache pattern");
        Ok(removed)
    }

    /// Remove every key matching `pattern`. Failures are logged and swallowed;
    /// returns the number of keys removed (zero on failure).
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        match self.try_invalidate_pattern(pattern).await {
            Ok(removed) => removed,
            Err(e) => {
                if self.config.enable_stats {
                    self.stats.invalidation_failures.fetch_add(1, Ordering::Relaxed);
                }
                warn!(pattern, error = %e, "Cache pattern invalidation failed, entries may be served until TTL expiry");
                0
            }
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let reads = hits + misses;

        CacheStats {
            hits,
            misses,
            populates: self.stats.populates.load(Ordering::Relaxed),
            populate_failures: self.stats.populate_failures.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            invalidation_failures: self.stats.invalidation_failures.load(Ordering::Relaxed),
            hit_ratio: if reads > 0 { hits as f64 / reads as f64 } else { 0.0 },
        }
    }

    /// Check if the store is reachable
    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Cache health check failed: {}", e);
                false
            }
        }
    }

    /// Read and decode `key`. Store errors and undecodable payloads read as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling through to populate");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write_back<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(key, error = %e, "Failed to serialize value for caching");
                return;
            }
        };

        match self.store.set_ex(key, &bytes, ttl).await {
            Ok(()) => {
                if self.config.enable_stats {
                    self.stats.populates.fetch_add(1, Ordering::Relaxed);
                }
                debug!(key, ttl = ?ttl, "Populated cache entry");
            }
            Err(e) => warn!(key, error = %e, "Cache write failed, returning uncached value"),
        }
    }

    fn record_hit(&self, key: &str) {
        if self.config.enable_stats {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        counter!(CACHE_HITS_TOTAL, "family" => keys::family(key).to_string()).increment(1);
    }

    fn record_miss(&self, key: &str) {
        if self.config.enable_stats {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        counter!(CACHE_MISSES_TOTAL, "family" => keys::family(key).to_string()).increment(1);
    }

    /// `key_or_pattern` only supplies the family label; patterns start with a literal family
    fn record_invalidations(&self, key_or_pattern: &str, removed: usize) {
        if removed == 0 {
            return;
        }
        if self.config.enable_stats {
            self.stats.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        }
        counter!(CACHE_INVALIDATIONS_TOTAL, "family" => keys::family(key_or_pattern).to_string())
            .increment(removed as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheError, InMemoryCache, InMemoryCacheConfig, ScanPage};
    use crate::core::clock::ManualClock;
    use async_trait::async_trait;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Barrier;

    fn manager_with_clock(page_size: Option<usize>) -> (CacheManager, Arc<InMemoryCache>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryCache::new(
            InMemoryCacheConfig {
                scan_page_size: page_size,
            },
            Arc::new(clock.clone()),
        ));
        let manager = CacheManager::new(store.clone(), CacheConfig::default());
        (manager, store, clock)
    }

    #[tokio::test]
    async fn test_hit_skips_populate_and_ttl_expiry_repopulates() {
        let (cache, _store, clock) = manager_with_clock(None);
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        let populate = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(vec!["basil".to_string()])
        };

        let first = cache.get_or_populate("plantType:1", ttl, populate).await.unwrap();
        let second = cache.get_or_populate("plantType:1", ttl, populate).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(ttl);
        cache.get_or_populate("plantType:1", ttl, populate).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.populates, 2);
    }

    #[tokio::test]
    async fn test_populate_failure_is_not_cached() {
        let (cache, store, _clock) = manager_with_clock(None);

        let result: Result<u32, String> = cache
            .get_or_populate("plant:9", Duration::from_secs(60), || async { Err("not found".to_string()) })
            .await;
        assert_eq!(result, Err("not found".to_string()));
        assert!(!store.contains("plant:9"));

        let value: Result<u32, String> = cache
            .get_or_populate("plant:9", Duration::from_secs(60), || async { Ok(7) })
            .await;
        assert_eq!(value, Ok(7));
        assert_eq!(cache.stats().populate_failures, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_overwritten() {
        let (cache, store, _clock) = manager_with_clock(None);
        store.set_ex("device:1", b"not json", Duration::from_secs(60)).await.unwrap();

        let value: Result<u32, String> = cache
            .get_or_populate("device:1", Duration::from_secs(60), || async { Ok(3) })
            .await;
        assert_eq!(value, Ok(3));
        assert_eq!(store.get("device:1").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_invalidate_then_read_repopulates() {
        let (cache, _store, _clock) = manager_with_clock(None);
        let ttl = Duration::from_secs(60);

        let _: Result<String, String> = cache.get_or_populate("plant:1", ttl, || async { Ok("old".to_string()) }).await;
        cache.invalidate("plant:1").await;
        cache.invalidate("plant:missing").await;

        let fresh: Result<String, String> = cache.get_or_populate("plant:1", ttl, || async { Ok("new".to_string()) }).await;
        assert_eq!(fresh, Ok("new".to_string()));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_pattern_invalidation_spans_scan_pages() {
        let (cache, store, _clock) = manager_with_clock(Some(3));
        for page in 0..7 {
            store
                .set_ex(&keys::plant_types_page(None, page), b"[]", Duration::from_secs(60))
                .await
                .unwrap();
        }
        store.set_ex(&keys::plant_type("1"), b"{}", Duration::from_secs(60)).await.unwrap();
        store
            .set_ex(&keys::plant_types_page(Some("fern"), 1), b"[]", Duration::from_secs(60))
            .await
            .unwrap();

        let removed = cache.invalidate_pattern(keys::PLANT_TYPE_PAGES).await;

        assert_eq!(removed, 7);
        assert!(store.scan_calls() >= 3);
        assert_eq!(store.batch_deletes(), 1);
        assert!(store.contains(&keys::plant_type("1")));
        assert!(store.contains(&keys::plant_types_page(Some("fern"), 1)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_populate() {
        let (cache, store, _clock) = manager_with_clock(None);
        let calls = AtomicUsize::new(0);
        // Both populates must be in flight at once before either may finish
        let barrier = Arc::new(Barrier::new(2));

        let populate = || {
            let barrier = barrier.clone();
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                barrier.wait().await;
                Ok::<_, String>(5u32)
            }
        };

        let ttl = Duration::from_secs(60);
        let (first, second) = tokio::join!(
            cache.get_or_populate("plant:1", ttl, populate),
            cache.get_or_populate("plant:1", ttl, populate),
        );

        assert_eq!(first, Ok(5));
        assert_eq!(second, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(store.get("plant:1").await.unwrap(), Some(b"5".to_vec()));
    }

    /// Records the name and labels of every counter registered through it
    #[derive(Default)]
    struct CapturingRecorder {
        counters: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl Recorder for CapturingRecorder {
        fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
        fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
        fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

        fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
            let labels = key
                .labels()
                .map(|label| (label.key().to_string(), label.value().to_string()))
                .collect();
            self.counters.lock().push((key.name().to_string(), labels));
            Counter::noop()
        }

        fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_invalidations_are_labelled_by_family() {
        let (cache, _store, _clock) = manager_with_clock(None);
        let recorder = CapturingRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            cache.record_invalidations(keys::PLANT_TYPE_PAGES, 4);
            cache.record_invalidations(&keys::device("d1"), 1);
            cache.record_invalidations(keys::PLANT_TYPE_SEARCH_PAGES, 0);
        });

        let counters = recorder.counters.lock();
        let families: Vec<&str> = counters
            .iter()
            .filter(|(name, _)| name == CACHE_INVALIDATIONS_TOTAL)
            .flat_map(|(_, labels)| labels.iter())
            .filter(|(key, _)| key == "family")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(families, vec!["plantTypes", "device"]);
        assert_eq!(cache.stats().invalidations, 5);
    }

    #[tokio::test]
    async fn test_pattern_without_matches_is_not_an_error() {
        let (cache, store, _clock) = manager_with_clock(None);

        assert_eq!(cache.try_invalidate_pattern("devices:*").await.unwrap(), 0);
        assert_eq!(store.batch_deletes(), 0);
    }

    /// Store whose every operation fails
    struct UnavailableStore;

    #[async_trait]
    impl CacheStore for UnavailableStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable)
        }

        async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }

        async fn scan(&self, _cursor: u64, _pattern: &str, _count: usize) -> CacheResult<ScanPage> {
            Err(CacheError::Unavailable)
        }

        async fn delete_many(&self, _keys: &[String]) -> CacheResult<usize> {
            Err(CacheError::Unavailable)
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades_to_backend_reads() {
        let cache = CacheManager::new(Arc::new(UnavailableStore), CacheConfig::default());

        let value: Result<u32, String> = cache
            .get_or_populate("plant:1", Duration::from_secs(60), || async { Ok(11) })
            .await;
        assert_eq!(value, Ok(11));

        cache.invalidate("plant:1").await;
        assert_eq!(cache.invalidate_pattern(keys::PLANT_TYPE_PAGES).await, 0);
        assert!(cache.try_invalidate_pattern(keys::PLANT_TYPE_PAGES).await.is_err());
        assert!(!cache.health_check().await);
        assert_eq!(cache.stats().invalidation_failures, 2);
    }
}
