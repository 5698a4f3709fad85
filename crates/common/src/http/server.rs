use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use http::{header::HeaderName, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

use super::{HttpLoggingConfig, HttpLoggingLayer};

/// CORS settings for the HTTP server
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// `["*"]` allows every origin
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    /// Parse a comma-separated origin list; empty means all origins.
    pub fn from_comma_separated(origins: &str) -> Self {
        let allowed_origins: Vec<String> = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            allowed_origins: if allowed_origins.is_empty() {
                vec!["*".to_string()]
            } else {
                allowed_origins
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub logging_config: HttpLoggingConfig,
    pub cors_config: Option<CorsConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6385,
            logging_config: HttpLoggingConfig::default(),
            cors_config: None,
        }
    }
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.len() == 1 && config.allowed_origins[0] == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-project-id"),
            HeaderName::from_static("x-roles"),
            HeaderName::from_static("x-request-id"),
        ])
        .max_age(Duration::from_secs(config.max_age_secs))
}

/// Serve `router` until the token is cancelled.
///
/// Request logging is always applied; CORS only when configured.
pub async fn run_http_server(
    config: HttpServerConfig,
    router: Router,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid server address {}:{}", config.host, config.port))?;

    let mut app = router.layer(HttpLoggingLayer::new(config.logging_config.clone()));
    if let Some(cors) = &config.cors_config {
        app = app.layer(build_cors_layer(cors));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    debug!(address = %addr, cors = config.cors_config.is_some(), "starting http server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            debug!("http server shutdown signal received");
        })
        .await
        .map_err(|e| {
            tracing::error!("http server error: {}", e);
            anyhow::Error::from(e)
        })?;

    debug!("http server stopped gracefully");
    Ok(())
}
