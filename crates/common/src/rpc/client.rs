use crate::auth::RequestContext;
use crate::domain::{
    DeviceChanges, DeviceField, DeviceRepository, DomainError, DomainResult, SortDir, SortKey,
};
use crate::nats::{RequestTransport, TransportError};
use crate::objects::DeviceObject;
use crate::rpc::{
    decode_message, encode_message, ConductorConfig, RpcEnvelope, RpcReply, RpcRequest, RpcResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Client side of the conductor: the operations the API delegates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConductorApi: Send + Sync {
    async fn device_create(
        &self,
        ctx: &RequestContext,
        name: String,
        device_uuid: String,
        device: DeviceObject,
    ) -> DomainResult<DeviceObject>;

    async fn device_list(
        &self,
        ctx: &RequestContext,
        limit: Option<usize>,
        marker: Option<String>,
        sort_key: DeviceField,
        sort_dir: SortDir,
    ) -> DomainResult<Vec<DeviceObject>>;

    async fn device_delete(&self, ctx: &RequestContext, device_uuid: String) -> DomainResult<()>;

    async fn device_show(&self, ctx: &RequestContext, device_uuid: String)
        -> DomainResult<DeviceObject>;

    async fn device_update(
        &self,
        ctx: &RequestContext,
        device_uuid: String,
        changes: DeviceChanges,
    ) -> DomainResult<DeviceObject>;
}

/// Sends conductor operations over a [`RequestTransport`] and waits for the
/// reply. Listing is answered from the local store.
pub struct ConductorClient {
    transport: Arc<dyn RequestTransport>,
    repository: Arc<dyn DeviceRepository>,
    config: ConductorConfig,
}

impl ConductorClient {
    pub fn new(
        transport: Arc<dyn RequestTransport>,
        repository: Arc<dyn DeviceRepository>,
        config: ConductorConfig,
    ) -> Self {
        Self {
            transport,
            repository,
            config,
        }
    }

    async fn call(&self, ctx: &RequestContext, request: RpcRequest) -> DomainResult<RpcResult> {
        let method = request.method();
        let payload = encode_message(&RpcEnvelope {
            context: ctx.clone(),
            request,
        })?;
        let timed_out = || {
            DomainError::ConductorTimeout(format!("{} (request {})", method, ctx.request_id))
        };

        let reply = tokio::time::timeout(
            self.config.rpc_timeout(),
            self.transport.request(&self.config.topic, payload),
        )
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| match e {
            TransportError::Timeout => timed_out(),
            TransportError::Other(err) => DomainError::ConductorError(err.to_string()),
        })?;

        debug!(method = method, "received conductor reply");
        decode_message::<RpcReply>(&reply)?.into_result()
    }
}

fn expect_device(method: &str, result: RpcResult) -> DomainResult<DeviceObject> {
    match result {
        RpcResult::Device(primitive) => DeviceObject::from_primitive(primitive),
        other => Err(DomainError::ConductorError(format!(
            "unexpected reply to {}: {:?}",
            method, other
        ))),
    }
}

#[async_trait]
impl ConductorApi for ConductorClient {
    #[instrument(skip(self, ctx, device), fields(request_id = %ctx.request_id))]
    async fn device_create(
        &self,
        ctx: &RequestContext,
        name: String,
        device_uuid: String,
        device: DeviceObject,
    ) -> DomainResult<DeviceObject> {
        let request = RpcRequest::DeviceCreate {
            name,
            device_uuid,
            device: device.to_primitive()?,
        };
        let result = self.call(ctx, request).await?;
        expect_device("device_create", result)
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    async fn device_list(
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
    async fn device_delete(&self, ctx: &RequestContext, device_uuid: String) -> DomainResult<()> {
        match self.call(ctx, RpcRequest::DeviceDelete { device_uuid }).await? {
            RpcResult::Empty => Ok(()),
            other => Err(DomainError::ConductorError(format!(
                "unexpected reply to device_delete: {:?}",
                other
            ))),
        }
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    async fn device_show(
        &self,
        ctx: &RequestContext,
        device_uuid: String,
    ) -> DomainResult<DeviceObject> {
        let result = self.call(ctx, RpcRequest::DeviceShow { device_uuid }).await?;
        expect_device("device_show", result)
    }

    #[instrument(skip(self, ctx, changes), fields(request_id = %ctx.request_id))]
    async fn device_update(
        &self,
        ctx: &RequestContext,
        device_uuid: String,
        changes: DeviceChanges,
    ) -> DomainResult<DeviceObject> {
        let result = self
            .call(
                ctx,
                RpcRequest::DeviceUpdate {
                    device_uuid,
                    changes,
                },
            )
            .await?;
        expect_device("device_update", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDeviceRepository;
    use crate::nats::MockRequestTransport;
    use bytes::Bytes;
    use std::time::Duration;

    fn client_with(transport: MockRequestTransport, timeout_secs: u64) -> ConductorClient {
        ConductorClient::new(
            Arc::new(transport),
            Arc::new(InMemoryDeviceRepository::new()),
            ConductorConfig {
                rpc_timeout_secs: timeout_secs,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_show_sends_envelope_to_topic_and_decodes_reply() {
        let mut transport = MockRequestTransport::new();
        transport
            .expect_request()
            .withf(|subject: &str, payload: &Bytes| {
                let envelope: RpcEnvelope = serde_json::from_slice(payload).unwrap();
                subject == "iot.conductor"
                    && envelope.context.request_id == "req-1"
                    && envelope.request
                        == RpcRequest::DeviceShow {
                            device_uuid: "abc".to_string(),
                        }
            })
            .times(1)
            .return_once(|_, _| {
                let mut device = DeviceObject::new();
                device.uuid = Some("abc".to_string());
                let reply = RpcReply::Ok(RpcResult::Device(device.to_primitive().unwrap()));
                Ok(Bytes::from(serde_json::to_vec(&reply).unwrap()))
            });

        let ctx = RequestContext {
            request_id: "req-1".to_string(),
            ..Default::default()
        };
        let device = client_with(transport, 30)
            .device_show(&ctx, "abc".to_string())
            .await
            .unwrap();

        assert_eq!(device.uuid.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_remote_error_is_rebuilt() {
        let mut transport = MockRequestTransport::new();
        transport.expect_request().return_once(|_, _| {
            let reply = RpcReply::from(Err::<RpcResult, _>(DomainError::DeviceNotFound(
                "abc".to_string(),
            )));
            Ok(Bytes::from(serde_json::to_vec(&reply).unwrap()))
        });

        let result = client_with(transport, 30)
            .device_delete(&RequestContext::default(), "abc".to_string())
            .await;

        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_transport_timeout_is_conductor_timeout() {
        let mut transport = MockRequestTransport::new();
        transport
            .expect_request()
            .return_once(|_, _| Err(TransportError::Timeout));

        let result = client_with(transport, 30)
            .device_show(&RequestContext::default(), "abc".to_string())
            .await;

        assert!(matches!(result, Err(DomainError::ConductorTimeout(_))));
    }

    struct SlowTransport;

    #[async_trait]
    impl RequestTransport for SlowTransport {
        async fn request(&self, _subject: &str, _payload: Bytes) -> Result<Bytes, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(TransportError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out() {
        let client = ConductorClient::new(
            Arc::new(SlowTransport),
            Arc::new(InMemoryDeviceRepository::new()),
            ConductorConfig {
                rpc_timeout_secs: 1,
                ..Default::default()
            },
        );

        let result = client
            .device_show(&RequestContext::default(), "abc".to_string())
            .await;

        assert!(matches!(result, Err(DomainError::ConductorTimeout(_))));
    }

    #[tokio::test]
    async fn test_list_is_served_from_the_local_store() {
        let repo = Arc::new(InMemoryDeviceRepository::new());
        for name in ["a", "b", "c"] {
            repo.create_device(DeviceChanges {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        let first = repo.get_device_by_id(1).await.unwrap();

        let mut transport = MockRequestTransport::new();
        transport.expect_request().times(0);
        let client = ConductorClient::new(Arc::new(transport), repo, ConductorConfig::default());

        let devices = client
            .device_list(
                &RequestContext::default(),
                Some(10),
                Some(first.uuid),
                DeviceField::Id,
                SortDir::Asc,
            )
            .await
            .unwrap();

        let names: Vec<_> = devices.iter().filter_map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }
}
