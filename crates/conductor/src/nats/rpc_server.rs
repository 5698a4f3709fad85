use crate::domain::ConductorHandler;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Serves conductor requests arriving on a NATS subject. Replicas share the
/// queue group so each request is handled exactly once.
pub struct ConductorRpcServer {
    client: async_nats::Client,
    topic: String,
    queue_group: String,
    handler: Arc<ConductorHandler>,
}

impl ConductorRpcServer {
    pub fn new(
        client: async_nats::Client,
        topic: impl Into<String>,
        queue_group: impl Into<String>,
        handler: Arc<ConductorHandler>,
    ) -> Self {
        Self {
            client,
            topic: topic.into(),
            queue_group: queue_group.into(),
            handler,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let mut subscriber = self
            .client
            .queue_subscribe(self.topic.clone(), self.queue_group.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.topic))?;

        info!(
            topic = %self.topic,
            queue_group = %self.queue_group,
            "starting conductor rpc server"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(topic = %self.topic, "received shutdown signal, stopping rpc server");
                    break;
                }
                message = subscriber.next() => {
                    let Some(message) = message else {
                        warn!(topic = %self.topic, "subscription closed");
                        break;
                    };

                    let Some(reply_to) = message.reply.clone() else {
                        warn!(subject = %message.subject, "dropping request without reply subject");
                        continue;
                    };

                    let handler = self.handler.clone();
                    let client = self.client.clone();
                    tokio::spawn(async move {
                        let reply = handler.handle_payload(&message.payload).await;
                        if let Err(e) = client.publish(reply_to, reply).await {
                            error!(error = %e, "failed to publish conductor reply");
                        }
                    });
                }
            }
        }

        if let Err(e) = subscriber.unsubscribe().await {
            debug!(error = %e, "unsubscribe after shutdown failed");
        }
        debug!("conductor rpc server stopped gracefully");
        Ok(())
    }
}
