use crate::domain::{DeviceService, DEFAULT_MAX_LIMIT};
use crate::rest::{build_iot_api_routes, DevicesController};
use axum::Router;
use common::auth::AuthGate;
use common::domain::DeviceRepository;
use common::http::{run_http_server, HttpServerConfig};
use common::rpc::ConductorApi;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Settings of the REST API process
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub http: HttpServerConfig,
    /// Base used for links; the request Host header when unset
    pub public_url: Option<String>,
    pub max_limit: usize,
    pub auth_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http: HttpServerConfig::default(),
            public_url: None,
            max_limit: DEFAULT_MAX_LIMIT,
            auth_enabled: false,
        }
    }
}

pub struct IotApi {
    router: Router,
    config: HttpServerConfig,
}

impl IotApi {
    pub fn new(
        conductor: Arc<dyn ConductorApi>,
        repository: Arc<dyn DeviceRepository>,
        config: ApiConfig,
    ) -> Self {
        debug!("initializing iot api module");
        let service = Arc::new(DeviceService::new(conductor, repository, config.max_limit));
        let controller = DevicesController::new(service, config.public_url);
        let router = build_iot_api_routes(controller, AuthGate::new(config.auth_enabled));

        Self {
            router,
            config: config.http,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { run_http_server(self.config, self.router, ctx).await })
    }
}
