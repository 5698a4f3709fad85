use async_trait::async_trait;
use common::auth::RequestContext;
use common::domain::DomainResult;
use common::objects::DeviceObject;
use tracing::debug;

/// Backend that realizes devices outside the registry (container engine,
/// hardware gateway, ...).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn create_device(
        &self,
        ctx: &RequestContext,
        name: &str,
        device: &DeviceObject,
    ) -> DomainResult<()>;

    async fn delete_device(&self, ctx: &RequestContext, device_uuid: &str) -> DomainResult<()>;

    async fn device_status(&self, ctx: &RequestContext, device: &DeviceObject)
        -> DomainResult<()>;

    async fn update_device(&self, ctx: &RequestContext, device: &DeviceObject)
        -> DomainResult<()>;
}

/// Driver that only records what it was asked to do
#[derive(Debug, Default, Clone)]
pub struct LoggingDeviceDriver;

#[async_trait]
impl DeviceDriver for LoggingDeviceDriver {
    async fn create_device(
        &self,
        ctx: &RequestContext,
        name: &str,
        device: &DeviceObject,
    ) -> DomainResult<()> {
        debug!(
            request_id = %ctx.request_id,
            device_uuid = ?device.uuid,
            "creating device name {}",
            name
        );
        Ok(())
    }

    async fn delete_device(&self, ctx: &RequestContext, device_uuid: &str) -> DomainResult<()> {
        debug!(request_id = %ctx.request_id, "device_delete {}", device_uuid);
        Ok(())
    }

    async fn device_status(
        &self,
        ctx: &RequestContext,
        device: &DeviceObject,
    ) -> DomainResult<()> {
        debug!(request_id = %ctx.request_id, "device_show {:?}", device.uuid);
        Ok(())
    }

    async fn update_device(
        &self,
        ctx: &RequestContext,
        device: &DeviceObject,
    ) -> DomainResult<()> {
        debug!(request_id = %ctx.request_id, "device_update {:?}", device.uuid);
        Ok(())
    }
}
