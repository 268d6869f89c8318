//! # Redis Cache Store
//!
//! Redis-backed cache store over a `ConnectionManager`, with retry and
//! reconnect on failed operations. Pattern scans use `SCAN ... MATCH ... COUNT`
//! and batch deletion runs as a single `MULTI`/`EXEC` pipeline.

use super::{CacheStore, ScanPage};
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, RedisResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Prefix prepended to every cache key (empty keeps keys as written)
    pub key_prefix: String,

    /// Maximum number of retries per operation
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// `PX` argument for a TTL: millisecond precision, never zero (Redis rejects it)
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

type RedisFuture<'a, T> = Pin<Box<dyn Future<Output = RedisResult<T>> + Send + 'a>>;

/// Redis cache implementation
pub struct RedisCache {
    /// Configuration
    config: RedisCacheConfig,

    /// Redis connection manager
    connection_manager: Arc<RwLock<ConnectionManager>>,

    /// Failed operations, including retried ones
    connection_errors: Arc<AtomicU64>,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(CacheError::Redis)?;

        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::Redis)?;

        info!("Redis cache connected to {}", config.url);

        Ok(Self {
            config,
            connection_manager: Arc::new(RwLock::new(connection_manager)),
            connection_errors: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of failed Redis operations since connect
    pub fn connection_errors(&self) -> u64 {
        self.connection_errors.load(Ordering::Relaxed)
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Strip the configured prefix from a key returned by SCAN
    fn logical_key(&self, key: String) -> String {
        match key.strip_prefix(self.config.key_prefix.as_str()) {
            Some(stripped) if !self.config.key_prefix.is_empty() => stripped.to_string(),
            _ => key,
        }
    }

    /// Execute a Redis operation with retry logic
    async fn execute_with_retry<F, T>(&self, operation: F) -> CacheResult<T>
    where
        F: for<'c> Fn(&'c mut ConnectionManager) -> RedisFuture<'c, T> + Send + Sync,
        T: Send,
    {
        let mut retries = 0;

        loop {
            let mut conn = self.connection_manager.write().await;

            match operation(&mut *conn).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    error!("Redis operation failed: {}", e);
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);

                    if retries >= self.config.max_retries || !is_retryable(&e) {
                        return Err(CacheError::Redis(e));
                    }

                    retries += 1;
                    drop(conn);

                    tokio::time::sleep(self.config.retry_delay * retries).await;

                    if let Err(reconnect_err) = self.reconnect().await {
                        warn!("Failed to reconnect to Redis: {}", reconnect_err);
                    }
                }
            }
        }
    }

    /// Reconnect to Redis
    async fn reconnect(&self) -> CacheResult<()> {
        let client = Client::open(self.config.url.as_str()).map_err(CacheError::Redis)?;

        let new_connection_manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::Redis)?;

        let mut conn = self.connection_manager.write().await;
        *conn = new_connection_manager;

        info!("Reconnected to Redis");
        Ok(())
    }
}

fn is_retryable(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);

        let value = self
            .execute_with_retry(|conn| {
                let full_key = full_key.clone();
                Box::pin(async move {
                    redis::cmd("GET")
                        .arg(&full_key)
                        .query_async::<_, Option<Vec<u8>>>(conn)
                        .await
                })
            })
            .await?;

        debug!(key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        let ttl_millis = expiry_millis(ttl);
        let value = value.to_vec();

        self.execute_with_retry(|conn| {
            let full_key = full_key.clone();
            let value = value.clone();
            Box::pin(async move {
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis)
                    .query_async::<_, ()>(conn)
                    .await
            })
        })
        .await?;

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        let deleted_count: i64 = self
            .execute_with_retry(|conn| {
                let full_key = full_key.clone();
                Box::pin(async move { redis::cmd("DEL").arg(&full_key).query_async(conn).await })
            })
            .await?;

        Ok(deleted_count > 0)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage> {
        let full_pattern = self.full_key(pattern);

        let (next_cursor, keys): (u64, Vec<String>) = self
            .execute_with_retry(|conn| {
                let full_pattern = full_pattern.clone();
                Box::pin(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&full_pattern)
                        .arg("COUNT")
                        .arg(count)
                        .query_async(conn)
                        .await
                })
            })
            .await?;

        Ok(ScanPage {
            cursor: next_cursor,
            keys: keys.into_iter().map(|key| self.logical_key(key)).collect(),
        })
    }

    async fn delete_many(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys: Vec<String> = keys.iter().map(|key| self.full_key(key)).collect();

        let counts: Vec<i64> = self
            .execute_with_retry(|conn| {
                let full_keys = full_keys.clone();
                Box::pin(async move {
                    let mut pipe = redis::pipe();
                    pipe.atomic();
                    for key in &full_keys {
                        pipe.cmd("DEL").arg(key);
                    }
                    pipe.query_async(conn).await
                })
            })
            .await?;

        let deleted = counts.into_iter().filter(|count| *count > 0).count();
        debug!("Deleted {} of {} Redis cache keys", deleted, keys.len());
        Ok(deleted)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let result = self
            .execute_with_retry(|conn| {
                Box::pin(async move { redis::cmd("PING").query_async::<_, String>(conn).await })
            })
            .await;

        match result {
            Ok(response) => Ok(response == "PONG"),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::SCAN_START;

    async fn setup_redis_cache(prefix: &str) -> RedisCache {
        let config = RedisCacheConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            key_prefix: prefix.to_string(),
            ..Default::default()
        };

        RedisCache::new(config).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_basic_operations() {
        let cache = setup_redis_cache("plantpulse-test:basic:").await;

        cache.set_ex("device:1", b"value", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("device:1").await.unwrap(), Some(b"value".to_vec()));

        assert!(cache.delete("device:1").await.unwrap());
        assert_eq!(cache.get("device:1").await.unwrap(), None);
    }

    #[test]
    fn test_expiry_keeps_sub_second_precision() {
        assert_eq!(expiry_millis(Duration::from_millis(500)), 500);
        assert_eq!(expiry_millis(Duration::from_millis(1900)), 1900);
        assert_eq!(expiry_millis(Duration::from_secs(60)), 60_000);
        assert_eq!(expiry_millis(Duration::from_micros(10)), 1);
        assert_eq!(expiry_millis(Duration::ZERO), 1);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_ttl_expiration() {
        let cache = setup_redis_cache("plantpulse-test:ttl:").await;

        cache.set_ex("expiring", b"v", Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("expiring").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_sub_second_ttl_expires_on_time() {
        let cache = setup_redis_cache("plantpulse-test:ttl-ms:").await;

        cache.set_ex("short", b"v", Duration::from_millis(500)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_scan_strips_prefix_and_batch_deletes() {
        let cache = setup_redis_cache("plantpulse-test:scan:").await;
        for i in 0..30 {
            cache
                .set_ex(&format!("plantTypes:page:{}", i), b"x", Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut cursor = SCAN_START;
        let mut keys = std::collections::BTreeSet::new();
        loop {
            let page = cache.scan(cursor, "plantTypes:page:*", 5).await.unwrap();
            keys.extend(page.keys);
            cursor = page.cursor;
            if cursor == SCAN_START {
                break;
            }
        }
        assert_eq!(keys.len(), 30);
        assert!(keys.iter().all(|key| key.starts_with("plantTypes:page:")));

        let keys: Vec<String> = keys.into_iter().collect();
        assert_eq!(cache.delete_many(&keys).await.unwrap(), 30);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_health_check() {
        let cache = setup_redis_cache("plantpulse-test:health:").await;
        assert!(cache.health_check().await.unwrap());
    }
}
