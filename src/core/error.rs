//! # Error Handling Module
//!
//! Crate-level error type for the PlantPulse core. Each subsystem (cache,
//! queue, object storage, document store, evaluator, ingestion) declares its
//! own `thiserror` enum next to the code that raises it; this module folds
//! them into a single [`PlantPulseError`] for callers that sit above several
//! subsystems at once, such as the worker binary.
//!
//! ## Error taxonomy
//! - cache populate failures surface to the caller and are never cached
//! - invalidation failures are logged and swallowed by the cache façade
//! - enrichment failures are replaced with per-field defaults
//! - evaluator failures are logged and the task is dropped
//! - unresolvable plants or plant types abort a single task silently

use thiserror::Error;

use crate::alerts::EvaluatorError;
use crate::caching::CacheError;
use crate::ingest::IngestError;
use crate::objects::ObjectStoreError;
use crate::queue::QueueError;
use crate::storage::StoreError;

/// Main result type used throughout the crate
pub type PlantPulseResult<T> = Result<T, PlantPulseError>;

/// Top-level error for the PlantPulse core
#[derive(Debug, Error)]
pub enum PlantPulseError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Cache store or cache façade failures
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Durable task queue failures
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Object storage failures (MinIO / S3)
    #[error("Object storage error: {0}")]
    ObjectStorage(#[from] ObjectStoreError),

    /// Upstream document store failures
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// Threshold evaluator failures
    #[error("Evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    /// Ingestion pipeline failures
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    /// I/O errors (config files, sockets, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal errors for unexpected failures
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlantPulseError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failed operation may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cache(err) => err.is_transient(),
            Self::Queue(err) => err.is_transient(),
            Self::ObjectStorage(err) => err.is_transient(),
            Self::Store(StoreError::Backend { .. }) => true,
            Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Short machine-readable name of the error category, used as a log field
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Cache(_) => "cache_error",
            Self::Queue(_) => "queue_error",
            Self::ObjectStorage(_) => "object_storage_error",
            Self::Store(_) => "store_error",
            Self::Evaluator(_) => "evaluator_error",
            Self::Ingest(_) => "ingest_error",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for PlantPulseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for PlantPulseError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("YAML error: {}", err),
        }
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid worker count: {}", workers)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::PlantPulseError::config(format!($($arg)*))
    };
}
