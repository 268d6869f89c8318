//! # MinIO Client
//!
//! S3-compatible client speaking path-style URLs (`<endpoint>/<bucket>/<key>`).
//! Every request, including the client's own uploads and downloads, goes
//! through a SigV4 presigned URL, so only the `host` header is ever signed.

use super::signing::{presign, Credentials, PresignRequest};
use super::{ObjectResult, ObjectStore, ObjectStoreError, PresignMethod};
use crate::core::clock::{system_clock, SharedClock};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Expiry of the links the client signs for its own requests
const REQUEST_LINK_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// MinIO / S3 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MinioConfig {
    /// Base URL, e.g. `http://minio:9000`
    pub endpoint: String,

    /// Signing region; MinIO accepts `us-east-1` unless configured otherwise
    pub region: String,

    pub access_key: String,

    pub secret_key: String,

    /// Bucket holding reading images
    pub bucket: String,

    /// Timeout for upload and download requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: "readings".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// MinIO object store client
pub struct MinioClient {
    http: Client,
    scheme: String,
    host: String,
    region: String,
    credentials: Credentials,
    clock: SharedClock,
}

impl MinioClient {
    pub fn new(config: &MinioConfig) -> ObjectResult<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Build a client that signs with timestamps from `clock`
    pub fn with_clock(config: &MinioConfig, clock: SharedClock) -> ObjectResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ObjectStoreError::InvalidEndpoint {
            message: format!("'{}': {}", config.endpoint, e),
        })?;

        let host = endpoint
            .host_str()
            .ok_or_else(|| ObjectStoreError::InvalidEndpoint {
                message: format!("'{}' has no host", config.endpoint),
            })?;
        let host = match endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let http = Client::builder().timeout(config.request_timeout).build()?;

        info!("Object storage client configured for {}", config.endpoint);

        Ok(Self {
            http,
            scheme: endpoint.scheme().to_string(),
            host,
            region: config.region.clone(),
            credentials: Credentials {
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
            },
            clock,
        })
    }

    fn sign(&self, method: PresignMethod, bucket: &str, key: &str, expiry: Duration) -> ObjectResult<String> {
        let path = format!("/{}/{}", bucket, key);
        presign(
            &self.credentials,
            &PresignRequest {
                method,
                scheme: &self.scheme,
                host: &self.host,
                path: &path,
                region: &self.region,
                expires: expiry,
                now: self.clock.now(),
            },
        )
    }
}

fn check_status(status: StatusCode, bucket: &str, key: &str) -> ObjectResult<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ObjectStoreError::Status {
            status: status.as_u16(),
            key: key.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MinioClient {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()> {
        let url = self.sign(PresignMethod::Put, bucket, key, REQUEST_LINK_EXPIRY)?;
        let size = body.len();

        let response = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        check_status(response.status(), bucket, key)?;
        debug!(bucket, key, size, "Uploaded object");
        Ok(())
    }

    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> ObjectResult<String> {
        self.sign(method, bucket, key, expiry)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ObjectResult<Bytes> {
        let url = self.sign(PresignMethod::Get, bucket, key, REQUEST_LINK_EXPIRY)?;

        let response = self.http.get(url).send().await?;
        check_status(response.status(), bucket, key)?;

        let body = response.bytes().await?;
        debug!(bucket, key, size = body.len(), "Downloaded object");
        Ok(body)
    }
}
