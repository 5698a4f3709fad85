use crate::domain::{
    Device, DeviceChanges, DeviceIdentity, DeviceRepository, DomainError, DomainResult,
    ListDevicesRepoInput,
};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[derive(Default)]
struct DeviceTable {
    rows: BTreeMap<i64, Device>,
    next_id: i64,
}

impl DeviceTable {
    fn find_id(&self, identity: &DeviceIdentity) -> Option<i64> {
        match identity {
            DeviceIdentity::Id(id) => self.rows.contains_key(id).then_some(*id),
            DeviceIdentity::Uuid(uuid) => self
                .rows
                .values()
                .find(|device| &device.uuid == uuid)
                .map(|device| device.id),
        }
    }
}

/// In-memory implementation of DeviceRepository backed by a BTreeMap.
///
/// Writes serialize on the table lock; reads share it.
#[derive(Clone, Default)]
pub struct InMemoryDeviceRepository {
    table: Arc<RwLock<DeviceTable>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    #[instrument(skip(self, values), fields(uuid = ?values.uuid))]
    async fn create_device(&self, values: DeviceChanges) -> DomainResult<Device> {
        let uuid = values.uuid_for_create()?;
        let mut table = self.table.write().await;

        if table.rows.values().any(|device| device.uuid == uuid) {
            return Err(DomainError::DeviceAlreadyExists(uuid));
        }

        table.next_id += 1;
        let now = Utc::now();
        let mut device = Device {
            id: table.next_id,
            uuid,
            name: String::new(),
            desc: String::new(),
            project_id: String::new(),
            user_id: String::new(),
            created_at: now,
            updated_at: now,
        };
        values.apply_to(&mut device);
        table.rows.insert(device.id, device.clone());

        debug!(id = device.id, "created device: {}", device.uuid);
        Ok(device)
    }

    #[instrument(skip(self))]
    async fn get_device_by_id(&self, device_id: i64) -> DomainResult<Device> {
        let table = self.table.read().await;
        table
            .rows
            .get(&device_id)
            .cloned()
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_device_by_uuid(&self, device_uuid: &str) -> DomainResult<Device> {
        let table = self.table.read().await;
        table
            .rows
            .values()
            .find(|device| device.uuid == device_uuid)
            .cloned()
            .ok_or_else(|| DomainError::DeviceNotFound(device_uuid.to_string()))
    }

    #[instrument(skip(self, input), fields(limit = ?input.limit, sort_key = %input.sort_key.0, sort_dir = %input.sort_dir))]
    async fn get_device_list(&self, input: ListDevicesRepoInput) -> DomainResult<Vec<Device>> {
        let table = self.table.read().await;
        let sort_key = input.sort_key.0;

        let mut devices: Vec<Device> = table
            .rows
            .values()
            .filter(|device| input.filters.iter().all(|filter| filter.matches(device)))
            .filter(|device| {
                input
                    .marker
                    .as_ref()
                    .map(|marker| marker.precedes(device, sort_key, input.sort_dir))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        devices.sort_by(|a, b| {
            let primary = a
                .value_of(sort_key)
                .compare(&b.value_of(sort_key))
                .unwrap_or(Ordering::Equal);
            input.sort_dir.apply(primary.then(a.id.cmp(&b.id)))
        });

        if let Some(limit) = input.limit {
            devices.truncate(limit);
        }

        debug!("found {} devices", devices.len());
        Ok(devices)
    }

    #[instrument(skip(self, values))]
    async fn update_device(&self, device_id: &str, values: DeviceChanges) -> DomainResult<Device> {
        values.ensure_no_uuid()?;
        let identity = DeviceIdentity::parse(device_id)?;
        let mut table = self.table.write().await;

        let id = table
            .find_id(&identity)
            .ok_or_else(|| DomainError::DeviceNotFound(identity.to_string()))?;
        let device = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| DomainError::DeviceNotFound(identity.to_string()))?;

        values.apply_to(device);
        device.updated_at = Utc::now();

        debug!(fields = ?values.fields(), "updated device: {}", device.uuid);
        Ok(device.clone())
    }

    #[instrument(skip(self))]
    async fn destroy_device(&self, device_id: &str) -> DomainResult<()> {
        let identity = DeviceIdentity::parse(device_id)?;
        let mut table = self.table.write().await;

        let id = table
            .find_id(&identity)
            .ok_or_else(|| DomainError::DeviceNotFound(identity.to_string()))?;
        table.rows.remove(&id);

        debug!("destroyed device: {}", identity);
        Ok(())
    }
}
