//! NATS-backed message bus.

use async_trait::async_trait;
use futures::StreamExt;

use crate::bus::{BusError, BusResult, InboundMessage, MessageBus, MessageStream};

/// Message bus over a core NATS connection.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to the given NATS URL.
    pub async fn connect(url: &str) -> BusResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        // Control-plane traffic is low volume; flush so requests leave
        // promptly instead of sitting in the client's write buffer.
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<MessageStream> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let stream = subscriber.map(|msg| InboundMessage {
            subject: msg.subject.to_string(),
            payload: msg.payload.to_vec(),
        });

        Ok(Box::pin(stream))
    }
}
