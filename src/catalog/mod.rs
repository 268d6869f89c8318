//! # Catalog
//!
//! Cached read paths and invalidating write paths for plant types, plants,
//! areas, containers and devices. Reads go through [`CacheManager::cached`]; writes commit to the
//! document store first and only then drop the affected keys, so a read racing
//! the write cannot repopulate the pre-write value after invalidation.
//!
//! A write invalidates every list its document appeared in before the write
//! as well as every list it appears in after, so moving a plant or device to
//! another owner drops both owners' lists.
//!
//! Invalidation failures are swallowed by the cache manager: a write that
//! committed is reported as successful even if its cache keys survive until
//! TTL expiry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::caching::{keys, CacheManager};
use crate::core::types::{Area, Container, Device, Plant, PlantType};
use crate::storage::{collections, DocumentStore, StoreError, StoreResult, PLANT_TYPE_PAGE_SIZE};
use tracing::{debug, info};

/// Cached repository over the document store
pub struct Catalog {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheManager>,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<CacheManager>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    // ---- plant types ----

    pub async fn plant_type(&self, id: &str) -> StoreResult<PlantType> {
        self.cache
            .cached(&keys::plant_type(id), || async {
                self.store
                    .plant_type(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(collections::PLANT_TYPES, id))
            })
            .await
    }

    /// One page (1-based) of plant types sorted by name. An empty page is
    /// `NotFound` and is not cached.
    pub async fn plant_types_page(&self, page: u32, search: Option<&str>) -> StoreResult<Vec<PlantType>> {
        let page = page.max(1);
        let key = keys::plant_types_page(search, page);

        self.cache
            .cached(&key, || async {
                let types = self
                    .store
                    .plant_types_page(page - 1, PLANT_TYPE_PAGE_SIZE, search)
                    .await?;

                if types.is_empty() {
                    return Err(StoreError::not_found(collections::PLANT_TYPES, format!("page {}", page)));
                }
                Ok(types)
            })
            .await
    }

    pub async fn create_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        self.store.insert_plant_type(plant_type).await?;

        self.invalidate_plant_type_listings().await;
        info!(plant_type_id = %plant_type.id, name = %plant_type.name, "Created plant type");
        Ok(())
    }

    pub async fn update_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        self.store.replace_plant_type(plant_type).await?;

        self.cache.invalidate(&keys::plant_type(&plant_type.id)).await;
        self.invalidate_plant_type_listings().await;
        info!(plant_type_id = %plant_type.id, "Updated plant type");
        Ok(())
    }

    async fn invalidate_plant_type_listings(&self) {
        self.cache.invalidate_pattern(keys::PLANT_TYPE_PAGES).await;
        self.cache.invalidate_pattern(keys::PLANT_TYPE_SEARCH_PAGES).await;
    }

    // ---- plants ----

    pub async fn plant(&self, id: &str) -> StoreResult<Plant> {
        self.cache
            .cached(&keys::plant(id), || async {
                self.store
                    .plant(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(collections::PLANTS, id))
            })
            .await
    }

    pub async fn plants_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Plant>> {
        self.cache
            .cached(&keys::plants_for_owner(owner_id), || self.store.plants_for_owner(owner_id))
            .await
    }

    /// Insert or update a plant. If the owner changed, the previous owner's
    /// list is dropped too.
    pub async fn save_plant(&self, plant: &Plant) -> StoreResult<()> {
        let previous_owner = self.store.plant(&plant.id).await?.map(|previous| previous.owner_id);
        self.store.save_plant(plant).await?;

        self.cache.invalidate(&keys::plant(&plant.id)).await;
        self.cache.invalidate(&keys::plants_for_owner(&plant.owner_id)).await;
        if let Some(previous_owner) = previous_owner.filter(|owner| *owner != plant.owner_id) {
            self.cache.invalidate(&keys::plants_for_owner(&previous_owner)).await;
            info!(plant_id = %plant.id, from = %previous_owner, to = %plant.owner_id, "Plant changed owner");
        }
        debug!(plant_id = %plant.id, "Saved plant");
        Ok(())
    }

    /// Delete a plant and detach the device that monitored it
    pub async fn delete_plant(&self, id: &str) -> StoreResult<Plant> {
        let plant = self
            .store
            .delete_plant(id)
            .await?
            .ok_or_else(|| StoreError::not_found(collections::PLANTS, id))?;

        self.cache.invalidate(&keys::plant(&plant.id)).await;
        self.cache.invalidate(&keys::plants_for_owner(&plant.owner_id)).await;

        if let Some(device_id) = plant.device_id.as_deref() {
            if let Some(mut device) = self.store.device(device_id).await? {
                if device.plant_id.as_deref() == Some(plant.id.as_str()) {
                    device.plant_id = None;
                    self.save_device(&device).await?;
                    debug!(device_id, plant_id = %plant.id, "Detached device from deleted plant");
                }
            }
        }

        info!(plant_id = %plant.id, "Deleted plant");
        Ok(plant)
    }

    // ---- devices ----

    pub async fn device(&self, id: &str) -> StoreResult<Device> {
        self.cache
            .cached(&keys::device(id), || async {
                self.store
                    .device(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(collections::DEVICES, id))
            })
            .await
    }

    pub async fn devices_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Device>> {
        self.cache
            .cached(&keys::devices_for_owner(owner_id), || self.store.devices_for_owner(owner_id))
            .await
    }

    pub async fn register_device(&self, device: &Device) -> StoreResult<()> {
        self.save_device(device).await?;
        info!(device_id = %device.id, mac = %device.mac_address, "Registered device");
        Ok(())
    }

    /// Insert or update a device. If the owner changed, the previous owner's
    /// list is dropped too.
    pub async fn save_device(&self, device: &Device) -> StoreResult<()> {
        let previous_owner = self.store.device(&device.id).await?.map(|previous| previous.owner_id);
        self.store.save_device(device).await?;

        self.cache.invalidate(&keys::device(&device.id)).await;
        self.cache.invalidate(&keys::devices_for_owner(&device.owner_id)).await;
        if let Some(previous_owner) = previous_owner.filter(|owner| *owner != device.owner_id) {
            self.cache.invalidate(&keys::devices_for_owner(&previous_owner)).await;
            info!(device_id = %device.id, from = %previous_owner, to = %device.owner_id, "Device changed owner");
        }
        Ok(())
    }

    // ---- areas ----

    pub async fn area(&self, id: &str) -> StoreResult<Area> {
        self.cache
            .cached(&keys::area(id), || async {
                self.store
                    .area(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(collections::AREAS, id))
            })
            .await
    }

    pub async fn areas_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Area>> {
        self.cache
            .cached(&keys::areas_for_owner(owner_id), || self.store.areas_for_owner(owner_id))
            .await
    }

    pub async fn create_area(&self, area: &Area) -> StoreResult<()> {
        self.store.insert_area(area).await?;

        self.cache.invalidate(&keys::areas_for_owner(&area.owner_id)).await;
        info!(area_id = %area.id, name = %area.name, "Created area");
        Ok(())
    }

    /// Place a plant in an existing area
    pub async fn assign_plant_to_area(&self, plant_id: &str, area_id: &str) -> StoreResult<Plant> {
        if self.store.area(area_id).await?.is_none() {
            return Err(StoreError::not_found(collections::AREAS, area_id));
        }
        let mut plant = self
            .store
            .plant(plant_id)
            .await?
            .ok_or_else(|| StoreError::not_found(collections::PLANTS, plant_id))?;

        plant.area_id = Some(area_id.to_string());
        self.save_plant(&plant).await?;
        debug!(plant_id, area_id, "Assigned plant to area");
        Ok(plant)
    }

    /// Delete an area and take every plant out of it. Each affected plant's
    /// document key and its owner's plant list are dropped along with the
    /// area's own keys.
    pub async fn delete_area(&self, id: &str) -> StoreResult<Area> {
        let affected = self.store.plants_in_area(id).await?;
        let area = self
            .store
            .delete_area(id)
            .await?
            .ok_or_else(|| StoreError::not_found(collections::AREAS, id))?;

        let mut owners = BTreeSet::from([area.owner_id.clone()]);
        for mut plant in affected {
            plant.area_id = None;
            self.store.save_plant(&plant).await?;
            self.cache.invalidate(&keys::plant(&plant.id)).await;
            owners.insert(plant.owner_id);
        }

        for owner in &owners {
            self.cache.invalidate(&keys::plants_for_owner(owner)).await;
        }
        self.cache.invalidate(&keys::areas_for_owner(&area.owner_id)).await;
        self.cache.invalidate(&keys::area(&area.id)).await;

        info!(area_id = %area.id, "Deleted area");
        Ok(area)
    }

    // ---- containers ----

    pub async fn containers(&self) -> StoreResult<Vec<Container>> {
        self.cache
            .cached(keys::CONTAINERS, || self.store.containers())
            .await
    }

    pub async fn create_container(&self, container: &Container) -> StoreResult<()> {
        self.store.insert_container(container).await?;

        self.cache.invalidate(keys::CONTAINERS).await;
        info!(container_id = %container.id, name = %container.name, "Created container");
        Ok(())
    }
}
