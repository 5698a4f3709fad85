use crate::domain::{changes_from_patch, PatchOperation, Query};
use common::auth::RequestContext;
use common::domain::{
    canonical_uuid, DeviceField, DeviceRepository, DomainResult, SortDir, SortKey,
};
use common::garde::{uuid_shape, validate_request};
use common::objects::DeviceObject;
use common::rpc::ConductorApi;
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_MAX_LIMIT: usize = 1000;

/// Body of a device creation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateDeviceRequest {
    #[garde(custom(uuid_shape))]
    #[serde(default)]
    pub uuid: Option<String>,
    #[garde(length(max = 255))]
    #[serde(default)]
    pub name: Option<String>,
    #[garde(length(max = 255))]
    #[serde(default)]
    pub desc: Option<String>,
    #[garde(length(max = 255))]
    #[serde(default)]
    pub project_id: Option<String>,
    #[garde(length(max = 255))]
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Pagination and filter parameters of a listing, as received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListDevicesRequest {
    pub marker: Option<String>,
    pub limit: Option<i64>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    pub queries: Vec<Query>,
}

/// One page of devices plus the normalized parameters that produced it
#[derive(Debug, Clone)]
pub struct DevicePage {
    pub devices: Vec<DeviceObject>,
    pub limit: usize,
    pub sort_key: DeviceField,
    pub sort_dir: SortDir,
}

/// Unset or non-positive limits get the maximum; larger ones are clamped.
pub fn validate_limit(limit: Option<i64>, max_limit: usize) -> usize {
    match limit {
        Some(limit) if limit > 0 => usize::try_from(limit).map_or(max_limit, |l| l.min(max_limit)),
        _ => max_limit,
    }
}

pub fn validate_sort_dir(sort_dir: Option<&str>) -> DomainResult<SortDir> {
    sort_dir.map_or(Ok(SortDir::default()), str::parse)
}

/// Domain service for the device resource.
///
/// Reads go straight to the object layer; mutations are delegated to the
/// conductor.
pub struct DeviceService {
    conductor: Arc<dyn ConductorApi>,
    repository: Arc<dyn DeviceRepository>,
    max_limit: usize,
}

impl DeviceService {
    pub fn new(
        conductor: Arc<dyn ConductorApi>,
        repository: Arc<dyn DeviceRepository>,
        max_limit: usize,
    ) -> Self {
        Self {
            conductor,
            repository,
            max_limit,
        }
    }

    #[instrument(skip(self, ctx, request), fields(request_id = %ctx.request_id, name = ?request.name))]
    pub async fn create_device(
        &self,
        ctx: &RequestContext,
        request: CreateDeviceRequest,
    ) -> DomainResult<DeviceObject> {
        validate_request(&request)?;

        let mut device = DeviceObject::new();
        let device_uuid = match request.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => {
                let uuid = canonical_uuid(uuid)?;
                device.set_uuid(uuid.clone());
                uuid
            }
            _ => String::new(),
        };
        let name = request.name.unwrap_or_default();
        device.set_name(name.clone());
        if let Some(desc) = request.desc {
            device.set_desc(desc);
        }
        if let Some(project_id) = request.project_id.or_else(|| ctx.project_id.clone()) {
            device.set_project_id(project_id);
        }
        if let Some(user_id) = request.user_id.or_else(|| ctx.user_id.clone()) {
            device.set_user_id(user_id);
        }

        let created = self
            .conductor
            .device_create(ctx, name, device_uuid, device)
            .await?;

        debug!(uuid = ?created.uuid, "device created");
        Ok(created)
    }

    #[instrument(skip(self, ctx, request), fields(request_id = %ctx.request_id, limit = ?request.limit, marker = ?request.marker))]
    pub async fn list_devices(
        &self,
        ctx: &RequestContext,
        request: ListDevicesRequest,
    ) -> DomainResult<DevicePage> {
        let limit = validate_limit(request.limit, self.max_limit);
        let sort_dir = validate_sort_dir(request.sort_dir.as_deref())?;
        let sort_key = match request.sort_key.as_deref() {
            Some(key) if !key.is_empty() => key.parse::<SortKey>()?,
            _ => SortKey::default(),
        };
        let filters = request
            .queries
            .iter()
            .map(Query::to_filter)
            .collect::<DomainResult<Vec<_>>>()?;

        let marker = match request.marker.as_deref() {
            Some(marker) if !marker.is_empty() => Some(canonical_uuid(marker)?),
            _ => None,
        };

        let devices = DeviceObject::list_after_uuid(
            self.repository.as_ref(),
            Some(limit),
            marker.as_deref(),
            sort_key,
            sort_dir,
            filters,
        )
        .await?;

        debug!(count = devices.len(), "listed devices");
        Ok(DevicePage {
            devices,
            limit,
            sort_key: sort_key.0,
            sort_dir,
        })
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn get_device(
        &self,
        ctx: &RequestContext,
        device_uuid: &str,
    ) -> DomainResult<DeviceObject> {
        let device_uuid = canonical_uuid(device_uuid)?;
        self.conductor.device_show(ctx, device_uuid).await
    }

    #[instrument(skip(self, ctx, patch), fields(request_id = %ctx.request_id, operations = patch.len()))]
    pub async fn update_device(
        &self,
        ctx: &RequestContext,
        device_uuid: &str,
        patch: Vec<PatchOperation>,
    ) -> DomainResult<DeviceObject> {
        let device_uuid = canonical_uuid(device_uuid)?;
        let changes = changes_from_patch(&patch)?;
        self.conductor
            .device_update(ctx, device_uuid, changes)
            .await
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn delete_device(&self, ctx: &RequestContext, device_uuid: &str) -> DomainResult<()> {
        let device_uuid = canonical_uuid(device_uuid)?;
        self.conductor.device_delete(ctx, device_uuid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DeviceChanges, DomainError, FilterOp};
    use common::memory::InMemoryDeviceRepository;
    use common::rpc::MockConductorApi;

    const UUID: &str = "bd9431c1-8d69-4ad3-803a-8d4a6b89fd36";

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "req-1".to_string(),
            user_id: Some("alice".to_string()),
            project_id: Some("proj-1".to_string()),
            roles: vec![],
        }
    }

    fn service(conductor: MockConductorApi, repo: Arc<InMemoryDeviceRepository>) -> DeviceService {
        DeviceService::new(Arc::new(conductor), repo, 10)
    }

    async fn seed(repo: &InMemoryDeviceRepository, names: &[&str]) {
        for name in names {
            repo.create_device(DeviceChanges {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        }
    }

    #[test]
    fn test_limit_normalization() {
        assert_eq!(validate_limit(None, 1000), 1000);
        assert_eq!(validate_limit(Some(0), 1000), 1000);
        assert_eq!(validate_limit(Some(-5), 1000), 1000);
        assert_eq!(validate_limit(Some(20), 1000), 20);
        assert_eq!(validate_limit(Some(5000), 1000), 1000);
    }

    #[test]
    fn test_sort_dir_validation() {
        assert_eq!(validate_sort_dir(None).unwrap(), SortDir::Asc);
        assert_eq!(validate_sort_dir(Some("desc")).unwrap(), SortDir::Desc);
        assert!(matches!(
            validate_sort_dir(Some("up")),
            Err(DomainError::InvalidParameterValue(_))
        ));
    }

    #[tokio::test]
    async fn test_create_fills_tenancy_from_context() {
        let mut conductor = MockConductorApi::new();
        conductor
            .expect_device_create()
            .withf(|_, name: &String, device_uuid: &String, device: &DeviceObject| {
                name == "sensor1"
                    && device_uuid.is_empty()
                    && device.project_id.as_deref() == Some("proj-1")
                    && device.user_id.as_deref() == Some("alice")
                    && device.changes().uuid.is_none()
            })
            .times(1)
            .returning(|_, _, _, device| Ok(device));

        let service = service(conductor, Arc::new(InMemoryDeviceRepository::new()));
        let request = CreateDeviceRequest {
            name: Some("sensor1".to_string()),
            desc: Some("temp sensor".to_string()),
            ..Default::default()
        };

        let device = service.create_device(&ctx(), request).await.unwrap();
        assert_eq!(device.desc.as_deref(), Some("temp sensor"));
    }

    #[tokio::test]
    async fn test_create_passes_canonical_uuid() {
        let mut conductor = MockConductorApi::new();
        conductor
            .expect_device_create()
            .withf(|_, _, device_uuid: &String, device: &DeviceObject| {
                device_uuid == UUID && device.uuid.as_deref() == Some(UUID)
            })
            .times(1)
            .returning(|_, _, _, device| Ok(device));

        let service = service(conductor, Arc::new(InMemoryDeviceRepository::new()));
        let request = CreateDeviceRequest {
            uuid: Some(UUID.to_uppercase()),
            ..Default::default()
        };

        service.create_device(&ctx(), request).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_body_before_dispatch() {
        let mut conductor = MockConductorApi::new();
        conductor.expect_device_create().times(0);

        let service = service(conductor, Arc::new(InMemoryDeviceRepository::new()));
        let request = CreateDeviceRequest {
            name: Some("x".repeat(256)),
            ..Default::default()
        };

        let result = service.create_device(&ctx(), request).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_list_pages_with_marker() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        seed(&repo, &["a", "b", "c", "d", "e"]).await;
        let service = service(MockConductorApi::new(), repo);

        let first = service
            .list_devices(
                &ctx(),
                ListDevicesRequest {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.limit, 2);
        let names: Vec<_> = first.devices.iter().filter_map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let second = service
            .list_devices(
                &ctx(),
                ListDevicesRequest {
                    limit: Some(2),
                    marker: first.devices[1].uuid.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = second.devices.iter().filter_map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_list_applies_queries_and_sorting() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        seed(&repo, &["a", "b", "c"]).await;
        let service = service(MockConductorApi::new(), repo);

        let page = service
            .list_devices(
                &ctx(),
                ListDevicesRequest {
                    sort_key: Some("name".to_string()),
                    sort_dir: Some("desc".to_string()),
                    queries: vec![Query {
                        op: FilterOp::Ne,
                        ..Query::new("name", "b")
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let names: Vec<_> = page.devices.iter().filter_map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(page.limit, 10);
        assert_eq!(page.sort_key, DeviceField::Name);
    }

    #[tokio::test]
    async fn test_list_with_unknown_marker_is_not_found() {
        let service = service(MockConductorApi::new(), Arc::new(InMemoryDeviceRepository::new()));
        let result = service
            .list_devices(
                &ctx(),
                ListDevicesRequest {
                    marker: Some(UUID.to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_with_unknown_sort_key_is_rejected() {
        let service = service(MockConductorApi::new(), Arc::new(InMemoryDeviceRepository::new()));
        let result = service
            .list_devices(
                &ctx(),
                ListDevicesRequest {
                    sort_key: Some("image_id".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DomainError::InvalidSortKey(_))));
    }

    #[tokio::test]
    async fn test_update_sends_patch_as_change_set() {
        let mut conductor = MockConductorApi::new();
        conductor
            .expect_device_update()
            .withf(|_, uuid: &String, changes: &DeviceChanges| {
                uuid == UUID && changes.name.as_deref() == Some("renamed")
            })
            .times(1)
            .returning(|_, _, _| Ok(DeviceObject::new()));

        let service = service(conductor, Arc::new(InMemoryDeviceRepository::new()));
        let patch = serde_json::from_value(serde_json::json!([
            {"op": "replace", "path": "/name", "value": "renamed"}
        ]))
        .unwrap();

        service.update_device(&ctx(), UUID, patch).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_uuid_never_reaches_conductor() {
        let mut conductor = MockConductorApi::new();
        conductor.expect_device_delete().times(0);
        conductor.expect_device_show().times(0);

        let service = service(conductor, Arc::new(InMemoryDeviceRepository::new()));
        assert!(matches!(
            service.delete_device(&ctx(), "not-a-uuid").await,
            Err(DomainError::InvalidUuid(_))
        ));
        assert!(matches!(
            service.get_device(&ctx(), "not-a-uuid").await,
            Err(DomainError::InvalidUuid(_))
        ));
    }
}
