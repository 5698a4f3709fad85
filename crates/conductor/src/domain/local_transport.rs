use crate::domain::ConductorHandler;
use async_trait::async_trait;
use bytes::Bytes;
use common::nats::{RequestTransport, TransportError};
use std::sync::Arc;

/// Delivers conductor requests to a handler in the same process, for
/// single-binary deployments without a message bus.
pub struct LocalTransport {
    handler: Arc<ConductorHandler>,
}

impl LocalTransport {
    pub fn new(handler: Arc<ConductorHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RequestTransport for LocalTransport {
    async fn request(&self, _subject: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        Ok(self.handler.handle_payload(&payload).await)
    }
}
