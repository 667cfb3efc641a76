//! Transport-agnostic message bus seam.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors surfaced by a bus implementation.
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying transport rejected the operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be encoded.
    #[error("encoding message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Stream of inbound messages for one subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Publish/subscribe over logical subjects.
///
/// Implementations must deliver a published message to every live
/// subscription on the same subject. Nothing beyond at-least-once,
/// per-publisher ordering is assumed by the callers.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    async fn subscribe(&self, subject: &str) -> BusResult<MessageStream>;
}

/// Publish a JSON-encoded message.
pub async fn publish_json<T: Serialize>(
    bus: &dyn MessageBus,
    subject: &str,
    message: &T,
) -> BusResult<()> {
    let payload = serde_json::to_vec(message)?;
    bus.publish(subject, payload).await
}
