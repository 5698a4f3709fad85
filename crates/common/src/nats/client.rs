use crate::nats::{RequestTransport, TransportError};
use anyhow::{anyhow, Context, Result};
use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    /// Connect, bounding both connection setup and every request/reply.
    pub async fn connect(url: &str, timeout: Duration, request_timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .request_timeout(Some(request_timeout))
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("successfully connected to NATS");
        Ok(Self { client })
    }

    pub fn client(&self) -> async_nats::Client {
        self.client.clone()
    }

    pub fn create_request_transport(&self) -> Arc<dyn RequestTransport> {
        Arc::new(NatsRequestTransport::new(self.client.clone()))
    }

    pub async fn close(self) -> Result<()> {
        info!("closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// NATS core request/reply implementation of [`RequestTransport`]
pub struct NatsRequestTransport {
    client: async_nats::Client,
}

impl NatsRequestTransport {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestTransport for NatsRequestTransport {
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        debug!(subject = %subject, bytes = payload.len(), "sending request");

        match self.client.request(subject.to_string(), payload).await {
            Ok(message) => Ok(message.payload),
            Err(e) => match e.kind() {
                RequestErrorKind::TimedOut => Err(TransportError::Timeout),
                RequestErrorKind::NoResponders => Err(TransportError::Other(anyhow!(
                    "no responders on subject {}",
                    subject
                ))),
                _ => Err(TransportError::Other(e.into())),
            },
        }
    }
}
