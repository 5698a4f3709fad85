use crate::domain::DeviceDriver;
use bytes::Bytes;
use common::auth::RequestContext;
use common::domain::{DeviceChanges, DeviceField, DeviceRepository, DomainResult, SortDir, SortKey};
use common::objects::{DeviceObject, ObjectPrimitive};
use common::rpc::{
    decode_message, encode_message, RemoteError, RpcEnvelope, RpcReply, RpcRequest, RpcResult,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Executes conductor operations: persists through [`DeviceObject`] and
/// drives the [`DeviceDriver`].
pub struct ConductorHandler {
    repository: Arc<dyn DeviceRepository>,
    driver: Arc<dyn DeviceDriver>,
}

impl ConductorHandler {
    pub fn new(repository: Arc<dyn DeviceRepository>, driver: Arc<dyn DeviceDriver>) -> Self {
        Self { repository, driver }
    }

    #[instrument(skip(self, ctx, device), fields(request_id = %ctx.request_id))]
    pub async fn device_create(
        &self,
        ctx: &RequestContext,
        name: String,
        device_uuid: String,
        device: ObjectPrimitive,
    ) -> DomainResult<DeviceObject> {
        let mut device = DeviceObject::from_primitive(device)?;
        if device.uuid.is_none() && !device_uuid.is_empty() {
            device.set_uuid(device_uuid);
        }
        self.driver.create_device(ctx, &name, &device).await?;
        device.create(self.repository.as_ref()).await?;

        debug!(uuid = ?device.uuid, "device created");
        Ok(device)
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn device_list(
        &self,
        ctx: &RequestContext,
        limit: Option<usize>,
        marker: Option<String>,
        sort_key: DeviceField,
        sort_dir: SortDir,
    ) -> DomainResult<Vec<DeviceObject>> {
        DeviceObject::list_after_uuid(
            self.repository.as_ref(),
            limit,
            marker.as_deref(),
            SortKey(sort_key),
            sort_dir,
            Vec::new(),
        )
        .await
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn device_delete(&self, ctx: &RequestContext, device_uuid: String) -> DomainResult<()> {
        let repo = self.repository.as_ref();
        let mut device = DeviceObject::get_by_uuid(repo, &device_uuid).await?;
        self.driver.delete_device(ctx, &device_uuid).await?;
        device.destroy(repo).await?;

        debug!("device deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn device_show(
        &self,
        ctx: &RequestContext,
        device_uuid: String,
    ) -> DomainResult<DeviceObject> {
        let device = DeviceObject::get_by_uuid(self.repository.as_ref(), &device_uuid).await?;
        self.driver.device_status(ctx, &device).await?;
        Ok(device)
    }

    #[instrument(skip(self, ctx, changes), fields(request_id = %ctx.request_id, fields = ?changes.fields()))]
    pub async fn device_update(
        &self,
        ctx: &RequestContext,
        device_uuid: String,
        changes: DeviceChanges,
    ) -> DomainResult<DeviceObject> {
        let repo = self.repository.as_ref();
        let mut device = DeviceObject::get_by_uuid(repo, &device_uuid).await?;
        device.apply_changes(&changes);
        device.save(repo).await?;
        self.driver.update_device(ctx, &device).await?;
        Ok(device)
    }

    /// Route one decoded request to its operation
    pub async fn dispatch(&self, envelope: RpcEnvelope) -> DomainResult<RpcResult> {
        let ctx = envelope.context;
        match envelope.request {
            RpcRequest::DeviceCreate {
                name,
                device_uuid,
                device,
            } => {
                let device = self.device_create(&ctx, name, device_uuid, device).await?;
                Ok(RpcResult::Device(device.to_primitive()?))
            }
            RpcRequest::DeviceList {
                limit,
                marker,
                sort_key,
                sort_dir,
            } => {
                let devices = self
                    .device_list(&ctx, limit, marker, sort_key, sort_dir)
                    .await?;
                let primitives = devices
                    .iter()
                    .map(DeviceObject::to_primitive)
                    .collect::<DomainResult<Vec<_>>>()?;
                Ok(RpcResult::Devices(primitives))
            }
            RpcRequest::DeviceDelete { device_uuid } => {
                self.device_delete(&ctx, device_uuid).await?;
                Ok(RpcResult::Empty)
            }
            RpcRequest::DeviceShow { device_uuid } => {
                let device = self.device_show(&ctx, device_uuid).await?;
                Ok(RpcResult::Device(device.to_primitive()?))
            }
            RpcRequest::DeviceUpdate {
                device_uuid,
                changes,
            } => {
                let device = self.device_update(&ctx, device_uuid, changes).await?;
                Ok(RpcResult::Device(device.to_primitive()?))
            }
        }
    }

    /// Decode a wire request, run it and encode the reply. Never fails: every
    /// problem becomes an error reply for the caller.
    pub async fn handle_payload(&self, payload: &[u8]) -> Bytes {
        let reply = match decode_message::<RpcEnvelope>(payload) {
            Ok(envelope) => {
                let method = envelope.request.method();
                let result = self.dispatch(envelope).await;
                if let Err(e) = &result {
                    debug!(method = method, error = %e, "conductor operation failed");
                }
                RpcReply::from(result)
            }
            Err(e) => {
                debug!(error = %e, "rejecting malformed conductor request");
                RpcReply::Err(RemoteError::from(&e))
            }
        };

        encode_message(&reply).unwrap_or_else(|e| {
            error!(error = %e, "failed to encode conductor reply");
            Bytes::from_static(br#"{"err":{"kind":"internal","message":"failed to encode reply"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockDeviceDriver;
    use common::domain::{DomainError, MockDeviceRepository};
    use common::memory::InMemoryDeviceRepository;

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "req-test".to_string(),
            ..Default::default()
        }
    }

    fn permissive_driver() -> MockDeviceDriver {
        let mut driver = MockDeviceDriver::new();
        driver.expect_create_device().returning(|_, _, _| Ok(()));
        driver.expect_delete_device().returning(|_, _| Ok(()));
        driver.expect_device_status().returning(|_, _| Ok(()));
        driver.expect_update_device().returning(|_, _| Ok(()));
        driver
    }

    fn new_device(name: &str) -> ObjectPrimitive {
        let mut device = DeviceObject::new();
        device.set_name(name);
        device.to_primitive().unwrap()
    }

    #[tokio::test]
    async fn test_create_drives_then_persists() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        let mut driver = MockDeviceDriver::new();
        driver
            .expect_create_device()
            .withf(|_, name: &str, device: &DeviceObject| {
                name == "sensor1" && device.id.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let handler = ConductorHandler::new(repo.clone(), Arc::new(driver));

        let created = handler
            .device_create(&ctx(), "sensor1".to_string(), String::new(), new_device("sensor1"))
            .await
            .unwrap();

        assert!(created.id.is_some());
        let stored = repo
            .get_device_by_uuid(created.uuid.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.name, "sensor1");
    }

    #[tokio::test]
    async fn test_driver_failure_on_create_persists_nothing() {
        let mut repo = MockDeviceRepository::new();
        repo.expect_create_device().times(0);
        let mut driver = MockDeviceDriver::new();
        driver
            .expect_create_device()
            .returning(|_, _, _| Err(DomainError::DriverError("engine down".to_string())));
        let handler = ConductorHandler::new(Arc::new(repo), Arc::new(driver));

        let result = handler
            .device_create(&ctx(), "x".to_string(), String::new(), new_device("x"))
            .await;

        assert!(matches!(result, Err(DomainError::DriverError(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_device_is_not_found() {
        let handler = ConductorHandler::new(
            Arc::new(InMemoryDeviceRepository::new()),
            Arc::new(permissive_driver()),
        );

        let result = handler
            .device_delete(&ctx(), "bd9431c1-8d69-4ad3-803a-8d4a6b89fd36".to_string())
            .await;

        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_saves_changes() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        let handler = ConductorHandler::new(repo.clone(), Arc::new(permissive_driver()));
        let created = handler
            .device_create(&ctx(), "a".to_string(), String::new(), new_device("a"))
            .await
            .unwrap();
        let uuid = created.uuid.clone().unwrap();

        let updated = handler
            .device_update(
                &ctx(),
                uuid.clone(),
                DeviceChanges {
                    desc: Some("now described".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.desc.as_deref(), Some("now described"));
        assert_eq!(updated.name.as_deref(), Some("a"));
        assert!(updated.changes().is_empty());
    }

    #[tokio::test]
    async fn test_handle_payload_round_trip() {
        let handler = ConductorHandler::new(
            Arc::new(InMemoryDeviceRepository::new()),
            Arc::new(permissive_driver()),
        );
        let envelope = RpcEnvelope {
            context: ctx(),
            request: RpcRequest::DeviceCreate {
                name: "sensor1".to_string(),
                device_uuid: String::new(),
                device: new_device("sensor1"),
            },
        };

        let reply_bytes = handler
            .handle_payload(&serde_json::to_vec(&envelope).unwrap())
            .await;
        let reply: RpcReply = serde_json::from_slice(&reply_bytes).unwrap();

        match reply.into_result().unwrap() {
            RpcResult::Device(primitive) => {
                let device = DeviceObject::from_primitive(primitive).unwrap();
                assert_eq!(device.name.as_deref(), Some("sensor1"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_gets_invalid_reply() {
        let handler = ConductorHandler::new(
            Arc::new(InMemoryDeviceRepository::new()),
            Arc::new(permissive_driver()),
        );

        let reply_bytes = handler.handle_payload(b"{\"nope\":true}").await;
        let reply: RpcReply = serde_json::from_slice(&reply_bytes).unwrap();

        assert!(matches!(reply.into_result(), Err(DomainError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_newer_object_version_is_rejected() {
        let handler = ConductorHandler::new(
            Arc::new(InMemoryDeviceRepository::new()),
            Arc::new(permissive_driver()),
        );
        let mut device = new_device("x");
        device.version = "1.5".to_string();

        let result = handler
            .device_create(&ctx(), "x".to_string(), String::new(), device)
            .await;

        assert!(matches!(
            result,
            Err(DomainError::IncompatibleObjectVersion { .. })
        ));
    }
}
