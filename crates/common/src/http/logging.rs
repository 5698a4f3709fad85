use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{error, info, Instrument, Span};

/// Configuration for HTTP request logging
#[derive(Clone, Debug, Default)]
pub struct HttpLoggingConfig {
    /// Path prefixes that are never logged
    pub ignored_paths: Vec<String>,
}

impl HttpLoggingConfig {
    pub fn new(ignored_paths: Vec<String>) -> Self {
        Self { ignored_paths }
    }

    fn should_ignore(&self, path: &str) -> bool {
        self.ignored_paths
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

/// Tower layer logging method, path, status and latency of each request
#[derive(Clone, Default)]
pub struct HttpLoggingLayer {
    config: HttpLoggingConfig,
}

impl HttpLoggingLayer {
    pub fn new(config: HttpLoggingConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for HttpLoggingLayer {
    type Service = HttpLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        HttpLoggingService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct HttpLoggingService<S> {
    inner: S,
    config: HttpLoggingConfig,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for HttpLoggingService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Error: std::fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let should_ignore = self.config.should_ignore(&path);
        let start = Instant::now();
        let future = self.inner.call(req);
        let span = Span::current();

        Box::pin(
            async move {
                let result = future.await;

                if !should_ignore {
                    let duration = start.elapsed();
                    match &result {
                        Ok(response) => {
                            let status = response.status().as_u16();
                            info!(
                                method = %method,
                                path = %path,
                                http_status = status,
                                duration_ms = %duration.as_millis(),
                                "{} {} - {} - {}ms",
                                method,
                                path,
                                status,
                                duration.as_millis()
                            );
                        }
                        Err(e) => {
                            error!(
                                method = %method,
                                path = %path,
                                duration_ms = %duration.as_millis(),
                                error = %e,
                                "{} {} - {}ms - ERROR: {}",
                                method,
                                path,
                                duration.as_millis(),
                                e
                            );
                        }
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_prefixes() {
        let config = HttpLoggingConfig::new(vec!["/health".to_string()]);
        assert!(config.should_ignore("/health/live"));
        assert!(!config.should_ignore("/v1/devices"));
    }
}
