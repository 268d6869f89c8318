//! # Enrichment Integration Tests
//!
//! The enrichment stage against a MinIO-compatible endpoint served by
//! wiremock.

use plantpulse_core::core::types::{EnrichmentStatus, NewReading, Reading};
use plantpulse_core::enrichment::{EnrichmentConfig, EnrichmentOutcome, ReadingEnricher};
use plantpulse_core::objects::{MinioClient, MinioConfig};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Little-endian TIFF whose Exif IFD holds a single UserComment
fn tiff_with_comment(text: &str) -> Vec<u8> {
    let mut comment = b"ASCII\0\0\0".to_vec();
    comment.extend_from_slice(text.as_bytes());

    let exif_ifd: u32 = 26;
    let data: u32 = exif_ifd + 18;

    let mut tiff = b"II".to_vec();
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&exif_ifd.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9286u16.to_le_bytes());
    tiff.extend_from_slice(&7u16.to_le_bytes());
    tiff.extend_from_slice(&(comment.len() as u32).to_le_bytes());
    tiff.extend_from_slice(&data.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(&comment);
    tiff
}

fn enricher_for(server: &MockServer) -> ReadingEnricher {
    let config = MinioConfig {
        endpoint: server.uri(),
        access_key: "minio".to_string(),
        secret_key: "minio123".to_string(),
        ..Default::default()
    };
    let client = MinioClient::new(&config).unwrap();
    ReadingEnricher::new(Arc::new(client), "readings", EnrichmentConfig::default())
}

fn reading_with_image(image: &str) -> Reading {
    Reading::from_new(
        NewReading {
            device_id: "device-1".to_string(),
            plant_id: "plant-1".to_string(),
            image: Some(image.to_string()),
            light: Some(800.0),
            ..Default::default()
        },
        chrono::Utc::now(),
    )
}

#[tokio::test]
async fn test_reading_is_enriched_from_object_storage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/readings/leaf.tiff"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tiff_with_comment("Lux: 1250")))
        .expect(1)
        .mount(&server)
        .await;

    let enricher = enricher_for(&server);
    let mut reading = reading_with_image("leaf.tiff");

    assert_eq!(enricher.enrich(&mut reading).await, EnrichmentOutcome::Enriched);

    let links = reading.derived_image_links.clone().unwrap();
    let primary = links.primary.unwrap();
    let secondary = links.secondary.unwrap();
    assert!(primary.starts_with(&format!("{}/readings/leaf.tiff?", server.uri())));
    assert!(secondary.starts_with(&format!("{}/readings/ndvi_leaf.tiff?", server.uri())));
    assert!(primary.contains("X-Amz-Expires=604800"));
    assert_eq!(reading.image_lux, Some(1250.0));
    assert_eq!(reading.light, Some(800.0));
    assert_eq!(reading.enrichment, EnrichmentStatus::Enriched);

    // a second pass leaves the reading alone
    assert_eq!(enricher.enrich(&mut reading).await, EnrichmentOutcome::AlreadyEnriched);
}

#[tokio::test]
async fn test_missing_image_defaults_the_metric_but_keeps_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let enricher = enricher_for(&server);
    let mut reading = reading_with_image("gone.jpg");

    assert_eq!(enricher.enrich(&mut reading).await, EnrichmentOutcome::Defaulted);
    assert_eq!(reading.image_lux, Some(0.0));
    assert_eq!(reading.enrichment, EnrichmentStatus::Defaulted);
    assert!(reading.derived_image_links.unwrap().primary.is_some());
}

#[tokio::test]
async fn test_image_without_label_defaults_the_metric() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/readings/leaf.tiff"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tiff_with_comment("shot at dawn")))
        .mount(&server)
        .await;

    let enricher = enricher_for(&server);
    let mut reading = reading_with_image("leaf.tiff");

    assert_eq!(enricher.enrich(&mut reading).await, EnrichmentOutcome::Defaulted);
    assert_eq!(reading.image_lux, Some(0.0));
}
