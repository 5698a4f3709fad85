use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request/reply over a message bus.
/// Abstracts the single operation the conductor client needs so dispatch can
/// run against NATS or in-process.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RequestTransport: Send + Sync {
    /// Send `payload` to `subject` and wait for exactly one reply
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, TransportError>;
}
