//! # Ingestion Pipeline
//!
//! The write path for a new sensor reading, with every stage explicit at the
//! call site:
//!
//! 1. upload the accompanying image, if any
//! 2. enrich the reading (derived links, image metadata)
//! 3. persist the reading
//! 4. enqueue it for threshold evaluation
//!
//! Only a failed persist fails the ingestion. Upload, enrichment and enqueue
//! problems are logged; alerting is best-effort and never blocks the write.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::{info, warn};

use crate::core::clock::SharedClock;
use crate::core::types::{NewReading, Reading};
use crate::enrichment::ReadingEnricher;
use crate::objects::ObjectStore;
use crate::observability::metrics::TASKS_ENQUEUED_TOTAL;
use crate::queue::{QueueBackend, QueuedTask};
use crate::storage::{DocumentStore, StoreError};

/// Ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid reading: {message}")]
    Invalid { message: String },

    #[error("Failed to persist reading: {0}")]
    Persist(#[from] StoreError),
}

/// Image bytes uploaded alongside a reading
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Reading ingestion pipeline
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    enricher: ReadingEnricher,
    queue: Arc<dyn QueueBackend>,
    clock: SharedClock,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        enricher: ReadingEnricher,
        queue: Arc<dyn QueueBackend>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            objects,
            enricher,
            queue,
            clock,
        }
    }

    /// Ingest one reading and return it as persisted
    pub async fn ingest(&self, new: NewReading, upload: Option<ImageUpload>) -> Result<Reading, IngestError> {
        if new.device_id.trim().is_empty() || new.plant_id.trim().is_empty() {
            return Err(IngestError::Invalid {
                message: "a reading must reference a device and a plant".to_string(),
            });
        }

        let mut reading = Reading::from_new(new, self.clock.now());

        if let Some(upload) = upload {
            match reading.image.as_deref() {
                None => reading.image = Some(upload.filename.clone()),
                Some(image) if image != upload.filename => {
                    return Err(IngestError::Invalid {
                        message: format!(
                            "reading names image '{}' but the upload is '{}'",
                            image, upload.filename
                        ),
                    });
                }
                Some(_) => {}
            }
            self.upload(&reading, upload).await;
        }

        let outcome = self.enricher.enrich(&mut reading).await;

        self.store.insert_reading(&reading).await?;

        let task = QueuedTask::new(reading.id.clone());
        match self.queue.enqueue(&task).await {
            Ok(()) => {
                counter!(TASKS_ENQUEUED_TOTAL).increment(1);
            }
            Err(e) => {
                warn!(reading_id = %reading.id, error = %e, "Failed to enqueue reading for evaluation, no alerts will be raised for it");
            }
        }

        info!(
            reading_id = %reading.id,
            device_id = %reading.device_id,
            plant_id = %reading.plant_id,
            enrichment = ?outcome,
            "Ingested reading"
        );
        Ok(reading)
    }

    async fn upload(&self, reading: &Reading, upload: ImageUpload) {
        let bucket = self.enricher.bucket();
        if let Err(e) = self
            .objects
            .put_object(bucket, &upload.filename, upload.body, &upload.content_type)
            .await
        {
            warn!(
                reading_id = %reading.id,
                image = %upload.filename,
                error = %e,
                "Image upload failed, enrichment will fall back to defaults"
            );
        }
    }
}
