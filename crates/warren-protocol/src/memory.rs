//! In-process message bus.
//!
//! Backs tests and single-process deployments where coordinator and
//! executor share a binary. Each subject maps to a broadcast channel;
//! a publish with no live subscriber is dropped, mirroring core NATS.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::bus::{BusResult, InboundMessage, MessageBus, MessageStream};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast-channel bus for a single process.
#[derive(Default)]
pub struct InProcessBus {
    subjects: Mutex<HashMap<String, broadcast::Sender<InboundMessage>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<InboundMessage> {
        let mut subjects = self.subjects.lock().expect("subject map poisoned");
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let message = InboundMessage {
            subject: subject.to_string(),
            payload,
        };
        // A send error only means nobody is subscribed right now.
        let _ = self.sender(subject).send(message);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<MessageStream> {
        let receiver = self.sender(subject).subscribe();

        let stream = futures::stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => return Some((msg, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-process bus subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::publish_json;
    use crate::messages::AcquireRequest;
    use futures::StreamExt;

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = InProcessBus::new();
        let mut a = bus.subscribe("t.sub").await.unwrap();
        let mut b = bus.subscribe("t.sub").await.unwrap();

        bus.publish("t.sub", b"hello".to_vec()).await.unwrap();

        assert_eq!(a.next().await.unwrap().payload, b"hello");
        assert_eq!(b.next().await.unwrap().payload, b"hello");
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_dropped() {
        let bus = InProcessBus::new();
        bus.publish("t.none", b"lost".to_vec()).await.unwrap();

        // A later subscriber must not see earlier traffic.
        let mut sub = bus.subscribe("t.none").await.unwrap();
        bus.publish("t.none", b"seen".to_vec()).await.unwrap();
        assert_eq!(sub.next().await.unwrap().payload, b"seen");
    }

    #[tokio::test]
    async fn typed_publish_round_trips() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("t.typed").await.unwrap();

        let req = AcquireRequest {
            session_id: "s-1".into(),
            project_id: "p-1".into(),
        };
        publish_json(&bus, "t.typed", &req).await.unwrap();

        let inbound = sub.next().await.unwrap();
        let decoded: AcquireRequest = serde_json::from_slice(&inbound.payload).unwrap();
        assert_eq!(decoded, req);
    }
}
