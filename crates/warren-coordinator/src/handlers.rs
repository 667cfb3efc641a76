//! Acquire-response consumers.
//!
//! Mirrors the executor side: one loop per subject, per-message tasks so a
//! slow response never blocks the next, malformed payloads dropped with a
//! warning, handler errors logged without killing the loop.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tracing::{error, info, warn};

use warren_protocol::{AcquireFailure, AcquireSuccess, MessageBus, subjects};

use crate::session::SessionOrchestrator;

pub struct ResponseListener {
    orchestrator: Arc<SessionOrchestrator>,
    bus: Arc<dyn MessageBus>,
}

impl ResponseListener {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, bus: Arc<dyn MessageBus>) -> Self {
        Self { orchestrator, bus }
    }

    /// Consume acquire successes until the subscription closes.
    pub async fn run_success_loop(self: Arc<Self>) -> Result<()> {
        let mut stream = self.bus.subscribe(subjects::ACQUIRE_SUCCESS).await?;
        info!(subject = subjects::ACQUIRE_SUCCESS, "listening");

        while let Some(msg) = stream.next().await {
            let response: AcquireSuccess = match serde_json::from_slice(&msg.payload) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "dropping malformed acquire success");
                    continue;
                }
            };
            let listener = self.clone();
            tokio::spawn(async move {
                if let Err(err) = listener.orchestrator.handle_acquire_success(response).await {
                    error!(error = %err, "handling acquire success failed");
                }
            });
        }

        Ok(())
    }

    /// Consume acquire failures until the subscription closes.
    pub async fn run_failure_loop(self: Arc<Self>) -> Result<()> {
        let mut stream = self.bus.subscribe(subjects::ACQUIRE_FAILURE).await?;
        info!(subject = subjects::ACQUIRE_FAILURE, "listening");

        while let Some(msg) = stream.next().await {
            let response: AcquireFailure = match serde_json::from_slice(&msg.payload) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "dropping malformed acquire failure");
                    continue;
                }
            };
            let listener = self.clone();
            tokio::spawn(async move {
                if let Err(err) = listener.orchestrator.handle_acquire_failure(response).await {
                    error!(error = %err, "handling acquire failure failed");
                }
            });
        }

        Ok(())
    }
}
