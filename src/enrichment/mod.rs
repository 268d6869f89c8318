//! # Reading Enrichment Stage
//!
//! Runs once per reading, before it is persisted, when the reading names an
//! image and has not been enriched yet:
//!
//! 1. presign a time-limited link for the primary image and for its derived
//!    counterpart (`<secondaryPrefix><image>`), each independently;
//! 2. download the image, read its EXIF user comment and pull the
//!    `<auxLabel>: <number>` value out of it.
//!
//! Nothing in this stage fails the ingestion. A link that cannot be signed is
//! left empty and an auxiliary value that cannot be read becomes `0.0`.

pub mod metadata;

use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{EnrichmentStatus, ImageLinks, Reading};
use crate::objects::{ObjectStore, PresignMethod};
use crate::observability::metrics::ENRICHMENT_DEFAULTS_TOTAL;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Value stored when the auxiliary metric cannot be read
pub const DEFAULT_AUX_METRIC: f64 = 0.0;

/// Enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrichmentConfig {
    /// Prefix that turns a primary image name into its derived image name
    pub secondary_prefix: String,

    /// Lifetime of derived image links
    #[serde(with = "humantime_serde")]
    pub link_expiry: Duration,

    /// Label preceding the auxiliary value in the image user comment
    pub aux_label: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            secondary_prefix: "ndvi_".to_string(),
            link_expiry: Duration::from_secs(7 * 24 * 60 * 60),
            aux_label: "Lux".to_string(),
        }
    }
}

/// What the enricher did to a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// Every field was derived
    Enriched,
    /// At least one field fell back to its default
    Defaulted,
    /// The reading carried no image; links are empty and the metric is the default
    NoImage,
    /// The reading had already been enriched and was left untouched
    AlreadyEnriched,
}

/// The enrichment stage
pub struct ReadingEnricher {
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    config: EnrichmentConfig,
}

impl ReadingEnricher {
    pub fn new(objects: Arc<dyn ObjectStore>, bucket: impl Into<String>, config: EnrichmentConfig) -> Self {
        Self {
            objects,
            bucket: bucket.into(),
            config,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Name of the derived image for `image`
    pub fn secondary_name(&self, image: &str) -> String {
        format!("{}{}", self.config.secondary_prefix, image)
    }

    /// Fill in the reading's enrichment fields. Never fails.
    pub async fn enrich(&self, reading: &mut Reading) -> EnrichmentOutcome {
        if reading.is_enriched() {
            debug!(reading_id = %reading.id, "Reading already enriched, skipping");
            return EnrichmentOutcome::AlreadyEnriched;
        }

        let image = match reading.image.clone() {
            Some(image) => image,
            None => {
                reading.apply_enrichment(None, DEFAULT_AUX_METRIC, EnrichmentStatus::Enriched);
                return EnrichmentOutcome::NoImage;
            }
        };

        let primary = self.link(&reading.id, &image, "primary_link").await;
        let secondary = self
            .link(&reading.id, &self.secondary_name(&image), "secondary_link")
            .await;
        let aux = self.aux_metric(&reading.id, &image).await;

        let defaulted = primary.is_none() || secondary.is_none() || aux.is_none();
        let status = if defaulted {
            EnrichmentStatus::Defaulted
        } else {
            EnrichmentStatus::Enriched
        };

        reading.apply_enrichment(
            Some(ImageLinks { primary, secondary }),
            aux.unwrap_or(DEFAULT_AUX_METRIC),
            status,
        );

        debug!(reading_id = %reading.id, image = %image, ?status, "Enriched reading");
        if defaulted {
            EnrichmentOutcome::Defaulted
        } else {
            EnrichmentOutcome::Enriched
        }
    }

    async fn link(&self, reading_id: &str, object: &str, field: &'static str) -> Option<String> {
        match self
            .objects
            .presigned_url(PresignMethod::Get, &self.bucket, object, self.config.link_expiry)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(reading_id, object, error = %e, "Failed to derive image link");
                counter!(ENRICHMENT_DEFAULTS_TOTAL, "field" => field).increment(1);
                None
            }
        }
    }

    async fn aux_metric(&self, reading_id: &str, image: &str) -> Option<f64> {
        let result = match self.objects.get_object(&self.bucket, image).await {
            Ok(bytes) => metadata::extract_labelled_value(&bytes, &self.config.aux_label).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(value) => Some(value),
            Err(reason) => {
                warn!(reading_id, image, reason = %reason, "Auxiliary metric unavailable, using default");
                counter!(ENRICHMENT_DEFAULTS_TOTAL, "field" => "aux_metric").increment(1);
                None
            }
        }
    }
}
