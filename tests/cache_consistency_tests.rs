//! # Cache Consistency Integration Tests
//!
//! Drives the catalog through the in-memory cache store and document store
//! and checks that no read observes a value older than the last completed
//! write through the catalog.

use plantpulse_core::caching::{keys, CacheConfig, CacheManager, InMemoryCache, InMemoryCacheConfig};
use plantpulse_core::catalog::Catalog;
use plantpulse_core::core::clock::ManualClock;
use plantpulse_core::core::types::{Area, AreaType, Device, Metric, MetricRange, Plant, PlantType};
use plantpulse_core::storage::{DocumentStore, MemoryDocumentStore};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryDocumentStore>,
    cache_store: Arc<InMemoryCache>,
    catalog: Catalog,
}

/// Catalog over an in-memory cache whose scan returns two keys per page
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryDocumentStore::new());
    let cache_store = Arc::new(InMemoryCache::new(
        InMemoryCacheConfig {
            scan_page_size: Some(2),
        },
        clock.clone(),
    ));
    let cache = Arc::new(CacheManager::new(
        cache_store.clone(),
        CacheConfig {
            default_ttl: Duration::from_secs(60),
            ..Default::default()
        },
    ));

    Harness {
        clock,
        catalog: Catalog::new(store.clone(), cache),
        store,
        cache_store,
    }
}

fn names(types: &[PlantType]) -> Vec<&str> {
    types.iter().map(|t| t.name.as_str()).collect()
}

#[tokio::test]
async fn test_new_plant_type_is_visible_in_every_cached_listing() {
    let h = harness();
    for name in ["Basil", "Mint", "Oregano", "Sage", "Thyme"] {
        h.catalog.create_plant_type(&PlantType::new(name)).await.unwrap();
    }

    // warm the unfiltered page and several search pages
    assert_eq!(h.catalog.plant_types_page(1, None).await.unwrap().len(), 5);
    assert_eq!(names(&h.catalog.plant_types_page(1, Some("bas")).await.unwrap()), vec!["Basil"]);
    assert_eq!(names(&h.catalog.plant_types_page(1, Some("m")).await.unwrap()), vec!["Mint", "Thyme"]);
    assert!(h.cache_store.contains(&keys::plant_types_page(Some("bas"), 1)));

    h.catalog.create_plant_type(&PlantType::new("Thai Basil")).await.unwrap();

    assert!(!h.cache_store.contains(&keys::plant_types_page(None, 1)));
    assert!(!h.cache_store.contains(&keys::plant_types_page(Some("bas"), 1)));
    assert!(!h.cache_store.contains(&keys::plant_types_page(Some("m"), 1)));
    assert!(h.cache_store.scan_calls() > 2);

    assert_eq!(h.catalog.plant_types_page(1, None).await.unwrap().len(), 6);
    assert_eq!(
        names(&h.catalog.plant_types_page(1, Some("bas")).await.unwrap()),
        vec!["Basil", "Thai Basil"]
    );
}

#[tokio::test]
async fn test_plant_type_update_reaches_detail_and_listing() {
    let h = harness();
    let mut basil = PlantType::new("Basil").with_range(Metric::Temperature, MetricRange::new(10.0, 30.0));
    h.catalog.create_plant_type(&basil).await.unwrap();
    h.catalog.plant_type(&basil.id).await.unwrap();
    h.catalog.plant_types_page(1, None).await.unwrap();

    basil = basil.with_range(Metric::Temperature, MetricRange::new(15.0, 25.0));
    basil.name = "Sweet Basil".to_string();
    h.catalog.update_plant_type(&basil).await.unwrap();

    let detail = h.catalog.plant_type(&basil.id).await.unwrap();
    assert_eq!(detail.range(Metric::Temperature), Some(&MetricRange::new(15.0, 25.0)));
    assert_eq!(names(&h.catalog.plant_types_page(1, None).await.unwrap()), vec!["Sweet Basil"]);
}

#[tokio::test]
async fn test_writes_outside_the_catalog_are_bounded_by_ttl() {
    let h = harness();
    let mut plant = Plant::new("owner-1", "Basil", "type-1");
    h.catalog.save_plant(&plant).await.unwrap();
    assert_eq!(h.catalog.plant(&plant.id).await.unwrap().name, "Basil");

    // bypasses invalidation
    plant.name = "Renamed".to_string();
    h.store.save_plant(&plant).await.unwrap();
    assert_eq!(h.catalog.plant(&plant.id).await.unwrap().name, "Basil");

    h.clock.advance(Duration::from_secs(61));
    assert_eq!(h.catalog.plant(&plant.id).await.unwrap().name, "Renamed");
}

#[tokio::test]
async fn test_deleting_a_plant_detaches_its_device() {
    let h = harness();
    let mut plant = Plant::new("owner-1", "Basil", "type-1");
    let mut device = Device::new("owner-1", "AA:BB:CC:DD:EE:FF");
    plant.device_id = Some(device.id.clone());
    device.plant_id = Some(plant.id.clone());

    h.catalog.save_plant(&plant).await.unwrap();
    h.catalog.register_device(&device).await.unwrap();

    // warm every affected key
    assert_eq!(h.catalog.plants_for_owner("owner-1").await.unwrap().len(), 1);
    assert_eq!(h.catalog.device(&device.id).await.unwrap().plant_id, Some(plant.id.clone()));
    assert_eq!(h.catalog.devices_for_owner("owner-1").await.unwrap().len(), 1);

    let deleted = h.catalog.delete_plant(&plant.id).await.unwrap();
    assert_eq!(deleted.id, plant.id);

    assert!(h.catalog.plant(&plant.id).await.unwrap_err().is_not_found());
    assert!(h.catalog.plants_for_owner("owner-1").await.unwrap().is_empty());
    assert_eq!(h.catalog.device(&device.id).await.unwrap().plant_id, None);
    assert_eq!(h.catalog.devices_for_owner("owner-1").await.unwrap()[0].plant_id, None);

    assert!(h.catalog.delete_plant(&plant.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_cache_stats_track_hits_and_misses() {
    let h = harness();
    let plant = Plant::new("owner-1", "Basil", "type-1");
    h.catalog.save_plant(&plant).await.unwrap();

    h.catalog.plant(&plant.id).await.unwrap();
    h.catalog.plant(&plant.id).await.unwrap();
    h.catalog.plant(&plant.id).await.unwrap();

    let stats = h.catalog.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.populates, 1);
}

#[tokio::test]
async fn test_transferred_plant_leaves_previous_owner_listing() {
    let h = harness();
    let mut plant = Plant::new("alice", "Rosemary", "type-1");
    h.catalog.save_plant(&plant).await.unwrap();
    assert_eq!(h.catalog.plants_for_owner("alice").await.unwrap().len(), 1);
    assert!(h.catalog.plants_for_owner("bob").await.unwrap().is_empty());

    plant.owner_id = "bob".to_string();
    h.catalog.save_plant(&plant).await.unwrap();

    assert!(h.catalog.plants_for_owner("alice").await.unwrap().is_empty());
    assert_eq!(h.catalog.plants_for_owner("bob").await.unwrap()[0].owner_id, "bob");
}

#[tokio::test]
async fn test_deleting_an_area_refreshes_plants_of_every_owner_in_it() {
    let h = harness();
    let area = Area::new("alice", "Shared plot", AreaType::Outdoor);
    h.catalog.create_area(&area).await.unwrap();

    let alice_plant = Plant::new("alice", "Squash", "type-1");
    let bob_plant = Plant::new("bob", "Beans", "type-1");
    for plant in [&alice_plant, &bob_plant] {
        h.catalog.save_plant(plant).await.unwrap();
        h.catalog.assign_plant_to_area(&plant.id, &area.id).await.unwrap();
        h.catalog.plant(&plant.id).await.unwrap();
        h.catalog.plants_for_owner(&plant.owner_id).await.unwrap();
    }
    assert_eq!(h.catalog.areas_for_owner("alice").await.unwrap().len(), 1);

    h.catalog.delete_area(&area.id).await.unwrap();

    for plant in [&alice_plant, &bob_plant] {
        assert!(!h.cache_store.contains(&keys::plant(&plant.id)));
        assert_eq!(h.catalog.plant(&plant.id).await.unwrap().area_id, None);
        assert_eq!(h.catalog.plants_for_owner(&plant.owner_id).await.unwrap()[0].area_id, None);
    }
    assert!(h.catalog.areas_for_owner("alice").await.unwrap().is_empty());
}
