//! # Configuration Module
//!
//! Loads the worker configuration from YAML, applies `PLANTPULSE_*`
//! environment overrides and validates the result before any client is
//! constructed.
//!
//! ## Key Features
//! - YAML parsing with serde; every section has defaults so partial files work
//! - Human-readable durations (`ttl: 1h`, `blockTimeout: 5s`)
//! - Environment variable overrides for deployment secrets and endpoints
//! - Validation with descriptive error messages

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::caching::{CacheConfig, RedisCacheConfig};
use crate::core::error::{PlantPulseError, PlantPulseResult};
use crate::enrichment::EnrichmentConfig;
use crate::objects::MinioConfig;
use crate::observability::ObservabilityConfig;
use crate::queue::QueueConfig;
use crate::storage::MongoConfig;

/// Longest expiry a SigV4 presigned URL may carry (seven days)
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlantPulseConfig {
    /// Redis connection shared by the cache store and the task queue
    pub redis: RedisCacheConfig,

    /// Cache façade behaviour (TTL, scan batch size)
    pub cache: CacheConfig,

    /// Alert task queue and worker pool
    pub queue: QueueConfig,

    /// Upstream document store
    pub mongo: MongoConfig,

    /// Object storage holding reading images
    pub object_storage: MinioConfig,

    /// Reading enrichment stage
    pub enrichment: EnrichmentConfig,

    /// Logging and metrics export
    pub observability: ObservabilityConfig,
}

impl PlantPulseConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> PlantPulseResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| PlantPulseError::config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    /// Parse, override from the environment and validate
    pub fn from_yaml_str(content: &str) -> PlantPulseResult<Self> {
        let mut config: PlantPulseConfig = serde_yaml::from_str(content)
            .map_err(|e| PlantPulseError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: PLANTPULSE_<SECTION>_<FIELD>
    /// For example: PLANTPULSE_QUEUE_WORKERS=8
    pub fn apply_env_overrides(&mut self) -> PlantPulseResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> PlantPulseResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PLANTPULSE_REDIS_URL") {
            self.redis.url = url;
        }

        if let Some(uri) = lookup("PLANTPULSE_MONGO_URI") {
            self.mongo.uri = uri;
        }

        if let Some(database) = lookup("PLANTPULSE_MONGO_DATABASE") {
            self.mongo.database = database;
        }

        if let Some(endpoint) = lookup("PLANTPULSE_MINIO_ENDPOINT") {
            self.object_storage.endpoint = endpoint;
        }

        if let Some(key) = lookup("PLANTPULSE_MINIO_ACCESS_KEY") {
            self.object_storage.access_key = key;
        }

        if let Some(secret) = lookup("PLANTPULSE_MINIO_SECRET_KEY") {
            self.object_storage.secret_key = secret;
        }

        if let Some(bucket) = lookup("PLANTPULSE_MINIO_BUCKET") {
            self.object_storage.bucket = bucket;
        }

        if let Some(workers) = lookup("PLANTPULSE_QUEUE_WORKERS") {
            self.queue.workers = workers.parse().map_err(|e| {
                PlantPulseError::config(format!("Invalid PLANTPULSE_QUEUE_WORKERS: {}", e))
            })?;
        }

        if let Some(ttl) = lookup("PLANTPULSE_CACHE_TTL") {
            self.cache.default_ttl = humantime::parse_duration(&ttl).map_err(|e| {
                PlantPulseError::config(format!("Invalid PLANTPULSE_CACHE_TTL: {}", e))
            })?;
        }

        if let Some(level) = lookup("PLANTPULSE_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> PlantPulseResult<()> {
        Url::parse(&self.redis.url)
            .map_err(|e| PlantPulseError::config(format!("Invalid redis url '{}': {}", self.redis.url, e)))?;

        if !self.mongo.uri.starts_with("mongodb://") && !self.mongo.uri.starts_with("mongodb+srv://") {
            return Err(PlantPulseError::config(format!(
                "Invalid mongo uri '{}': expected a mongodb:// or mongodb+srv:// scheme",
                self.mongo.uri
            )));
        }

        if self.mongo.database.trim().is_empty() {
            return Err(PlantPulseError::config("Mongo database name cannot be empty"));
        }

        Url::parse(&self.object_storage.endpoint).map_err(|e| {
            PlantPulseError::config(format!(
                "Invalid object storage endpoint '{}': {}",
                self.object_storage.endpoint, e
            ))
        })?;

        if self.object_storage.bucket.trim().is_empty() {
            return Err(PlantPulseError::config("Object storage bucket cannot be empty"));
        }

        if self.cache.default_ttl.is_zero() {
            return Err(PlantPulseError::config("Cache TTL must be greater than zero"));
        }

        if self.cache.scan_count == 0 {
            return Err(PlantPulseError::config("Cache scan count must be at least 1"));
        }

        if self.queue.workers == 0 {
            return Err(PlantPulseError::config("Queue worker count must be at least 1"));
        }

        if self.queue.name.trim().is_empty() {
            return Err(PlantPulseError::config("Queue name cannot be empty"));
        }

        if self.enrichment.link_expiry.is_zero() || self.enrichment.link_expiry > MAX_PRESIGN_EXPIRY {
            return Err(PlantPulseError::config(format!(
                "Image link expiry must be between 1s and {}",
                humantime::format_duration(MAX_PRESIGN_EXPIRY)
            )));
        }

        if self.enrichment.aux_label.trim().is_empty() {
            return Err(PlantPulseError::config("Auxiliary metric label cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
redis:
  url: redis://cache:6379
cache:
  defaultTtl: 10m
  scanCount: 250
queue:
  name: taskQueue
  workers: 6
  blockTimeout: 2s
mongo:
  uri: mongodb://mongo:27017
  database: plantpulse
objectStorage:
  endpoint: http://minio:9000
  bucket: readings
  accessKey: minio
  secretKey: minio123
enrichment:
  secondaryPrefix: ndvi_
  linkExpiry: 7days
  auxLabel: Lux
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: PlantPulseConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.redis.url, "redis://cache:6379");
        assert_eq!(config.cache.default_ttl, Duration::from_secs(600));
        assert_eq!(config.cache.scan_count, 250);
        assert_eq!(config.queue.workers, 6);
        assert_eq!(config.queue.block_timeout, Duration::from_secs(2));
        assert_eq!(config.enrichment.link_expiry, MAX_PRESIGN_EXPIRY);
        assert_eq!(config.object_storage.bucket, "readings");
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PlantPulseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.queue.name, "taskQueue");
        assert_eq!(config.enrichment.secondary_prefix, "ndvi_");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PLANTPULSE_REDIS_URL", "redis://other:6380"),
            ("PLANTPULSE_QUEUE_WORKERS", "12"),
            ("PLANTPULSE_CACHE_TTL", "90s"),
            ("PLANTPULSE_MINIO_BUCKET", "images"),
        ]
        .into_iter()
        .collect();

        let mut config = PlantPulseConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.redis.url, "redis://other:6380");
        assert_eq!(config.queue.workers, 12);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(90));
        assert_eq!(config.object_storage.bucket, "images");
    }

    #[test]
    fn test_invalid_worker_override_is_rejected() {
        let mut config = PlantPulseConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "PLANTPULSE_QUEUE_WORKERS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(PlantPulseError::Configuration { .. })));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = PlantPulseConfig::default();
        config.queue.workers = 0;
        assert!(config.validate().is_err());

        let mut config = PlantPulseConfig::default();
        config.enrichment.link_expiry = Duration::from_secs(8 * 24 * 60 * 60);
        assert!(config.validate().is_err());

        let mut config = PlantPulseConfig::default();
        config.mongo.uri = "postgres://localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PlantPulseConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.mongo.database, "plantpulse");
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let result = PlantPulseConfig::load_from_file("/nonexistent/plantpulse.yaml").await;
        assert!(matches!(result, Err(PlantPulseError::Configuration { .. })));
    }
}
