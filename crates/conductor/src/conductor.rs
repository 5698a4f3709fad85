use crate::domain::{ConductorHandler, DeviceDriver, LocalTransport};
use crate::nats::ConductorRpcServer;
use common::domain::DeviceRepository;
use common::nats::RequestTransport;
use common::rpc::ConductorConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The conductor service: owns the handler and exposes it either over NATS
/// or in-process.
pub struct Conductor {
    handler: Arc<ConductorHandler>,
    config: ConductorConfig,
}

impl Conductor {
    pub fn new(
        repository: Arc<dyn DeviceRepository>,
        driver: Arc<dyn DeviceDriver>,
        config: ConductorConfig,
    ) -> Self {
        info!(topic = %config.topic, "initializing conductor");
        Self {
            handler: Arc::new(ConductorHandler::new(repository, driver)),
            config,
        }
    }

    pub fn handler(&self) -> Arc<ConductorHandler> {
        self.handler.clone()
    }

    /// Transport that calls this conductor directly, bypassing the bus.
    pub fn local_transport(&self) -> Arc<dyn RequestTransport> {
        Arc::new(LocalTransport::new(self.handler.clone()))
    }

    pub fn into_runner_process(
        self,
        client: async_nats::Client,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        let server = ConductorRpcServer::new(
            client,
            self.config.topic,
            self.config.queue_group,
            self.handler,
        );
        Box::new(move |ctx| Box::pin(async move { server.run(ctx).await }))
    }
}
