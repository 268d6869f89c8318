//! # Object Storage Module
//!
//! Bucket/key object storage holding the images that accompany readings.
//! The enrichment stage derives time-limited links through
//! [`ObjectStore::presigned_url`] and reads image bytes back for metadata
//! parsing; the ingestion pipeline uploads through [`ObjectStore::put_object`].

pub mod memory;
pub mod minio;
pub mod signing;

pub use memory::MemoryObjectStore;
pub use minio::{MinioClient, MinioConfig};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// HTTP method a presigned link is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

impl PresignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// Object storage operation result
pub type ObjectResult<T> = Result<T, ObjectStoreError>;

/// Object storage errors
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object '{bucket}/{key}' not found")]
    NotFound { bucket: String, key: String },

    #[error("Object storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object storage returned status {status} for '{key}'")]
    Status { status: u16, key: String },

    #[error("Request signing failed: {message}")]
    Signing { message: String },

    #[error("Invalid object storage endpoint: {message}")]
    InvalidEndpoint { message: String },

    #[error("Object storage unavailable: {message}")]
    Unavailable { message: String },
}

impl ObjectStoreError {
    /// Failures worth retrying: connection problems and 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Unavailable { .. } => true,
            _ => false,
        }
    }
}

/// Object storage client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()>;

    /// A URL granting `method` on the object until `expiry` elapses
    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> ObjectResult<String>;

    async fn get_object(&self, bucket: &str, key: &str) -> ObjectResult<Bytes>;
}
