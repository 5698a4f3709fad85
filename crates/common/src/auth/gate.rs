use crate::auth::RequestContext;
use crate::domain::DomainError;
use crate::http::ApiError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// Pass/fail gate in front of the API routes.
#[derive(Debug, Clone)]
pub struct AuthGate {
    pub enabled: bool,
    pub public_paths: Vec<String>,
}

impl AuthGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            public_paths: vec!["/".to_string()],
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| public == path)
    }

    pub fn check(&self, path: &str, ctx: &RequestContext) -> Result<(), DomainError> {
        if self.enabled && !self.is_public(path) && !ctx.is_authenticated() {
            return Err(DomainError::NotAuthorized(format!(
                "authentication required for {}",
                path
            )));
        }
        Ok(())
    }
}

/// axum middleware: builds the [`RequestContext`], rejects unauthenticated
/// callers and makes the context available as a request extension.
pub async fn auth_gate(State(gate): State<AuthGate>, mut request: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(request.headers());
    let path = request.uri().path().to_string();

    if let Err(e) = gate.check(&path, &ctx) {
        debug!(path = %path, request_id = %ctx.request_id, "rejecting unauthenticated request");
        return ApiError(e).into_response();
    }

    request.extensions_mut().insert(ctx);
    next.run(request).await
}
