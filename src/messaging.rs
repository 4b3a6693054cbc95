//! Order event publishing
//!
//! Events go out after the store commits. Publishing is best effort: a failed
//! publish is logged and never rolls back or fails the operation.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError>;
}

/// Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError> {
        debug!(subject = event.subject(), order_id = %event.order_id(), "no broker, event dropped");
        Ok(())
    }
}

/// JSON events on `bakery.orders.<kind>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let client = async_nats::connect(url).await.map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Publishes each event, logging failures instead of returning them.
pub async fn publish_all(publisher: &dyn EventPublisher, events: &[OrderEvent]) {
    for event in events {
        if let Err(e) = publisher.publish(event).await {
            warn!(subject = event.subject(), order_id = %event.order_id(), error = %e, "event publish failed");
        }
    }
}
