//! In-memory object store with failure injection, for tests and local runs.

use super::{ObjectResult, ObjectStore, ObjectStoreError, PresignMethod};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::time::Duration;

/// Base of the fake links handed out by [`MemoryObjectStore`]
pub const MEMORY_LINK_BASE: &str = "memory://objects";

/// In-memory object store
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), (Bytes, String)>,

    /// Keys whose presign requests fail
    failing_presign: DashSet<String>,

    /// Keys whose downloads fail
    failing_get: DashSet<String>,

    /// Keys whose uploads fail
    failing_put: DashSet<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, bypassing failure injection
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>, content_type: &str) {
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            (body.into(), content_type.to_string()),
        );
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects.contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn fail_presign_for(&self, key: &str) {
        self.failing_presign.insert(key.to_string());
    }

    pub fn fail_get_for(&self, key: &str) {
        self.failing_get.insert(key.to_string());
    }

    pub fn fail_put_for(&self, key: &str) {
        self.failing_put.insert(key.to_string());
    }

    fn unavailable(operation: &str, key: &str) -> ObjectStoreError {
        ObjectStoreError::Unavailable {
            message: format!("injected {} failure for '{}'", operation, key),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()> {
        if self.failing_put.contains(key) {
            return Err(Self::unavailable("put", key));
        }
        self.insert(bucket, key, body, content_type);
        Ok(())
    }

    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> ObjectResult<String> {
        if self.failing_presign.contains(key) {
            return Err(Self::unavailable("presign", key));
        }
        Ok(format!(
            "{}/{}/{}?method={}&expires={}",
            MEMORY_LINK_BASE,
            bucket,
            key,
            method.as_str(),
            expiry.as_secs()
        ))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ObjectResult<Bytes> {
        if self.failing_get.contains(key) {
            return Err(Self::unavailable("get", key));
        }
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.0.clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}
