//! Executor message handlers.
//!
//! Consumes acquire and cleanup requests, drives the pool, and emits the
//! responses. Every acquire request resolves to exactly one outbound
//! message; no handler error escapes unacknowledged.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tracing::{error, info, warn};

use warren_protocol::{
    AcquireFailure, AcquireRequest, AcquireSuccess, CleanupAck, CleanupRequest, MessageBus,
    publish_json, subjects,
};

use crate::pool::ContainerPool;

/// Message-driven front of the container pool.
pub struct ExecutorService {
    pool: Arc<ContainerPool>,
    bus: Arc<dyn MessageBus>,
}

impl ExecutorService {
    pub fn new(pool: Arc<ContainerPool>, bus: Arc<dyn MessageBus>) -> Self {
        Self { pool, bus }
    }

    /// Consume acquire requests until the subscription closes.
    ///
    /// Each request is handled on its own task so requests for different
    /// sessions run fully in parallel; requests for the same session
    /// converge on the pool's single-flight creation.
    pub async fn run_acquire_loop(self: Arc<Self>) -> Result<()> {
        let mut stream = self.bus.subscribe(subjects::ACQUIRE_REQUEST).await?;
        info!(subject = subjects::ACQUIRE_REQUEST, "listening");

        while let Some(msg) = stream.next().await {
            let request: AcquireRequest = match serde_json::from_slice(&msg.payload) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "dropping malformed acquire request");
                    continue;
                }
            };
            let service = self.clone();
            tokio::spawn(async move {
                service.handle_acquire(request).await;
            });
        }

        Ok(())
    }

    /// Consume cleanup requests until the subscription closes.
    pub async fn run_cleanup_loop(self: Arc<Self>) -> Result<()> {
        let mut stream = self.bus.subscribe(subjects::CLEANUP_REQUEST).await?;
        info!(subject = subjects::CLEANUP_REQUEST, "listening");

        while let Some(msg) = stream.next().await {
            let request: CleanupRequest = match serde_json::from_slice(&msg.payload) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "dropping malformed cleanup request");
                    continue;
                }
            };
            let service = self.clone();
            tokio::spawn(async move {
                service.handle_cleanup(request).await;
            });
        }

        Ok(())
    }

    /// Resolve a container for the session and answer with success or
    /// failure.
    pub async fn handle_acquire(&self, request: AcquireRequest) {
        info!(
            session_id = %request.session_id,
            project_id = %request.project_id,
            "acquire request received"
        );

        match self
            .pool
            .resolve(&request.session_id, &request.project_id)
            .await
        {
            Ok(container_id) => {
                info!(
                    session_id = %request.session_id,
                    container_id = %container_id,
                    "container acquired"
                );
                let response = AcquireSuccess {
                    session_id: request.session_id,
                    project_id: request.project_id,
                    container_id,
                };
                if let Err(err) =
                    publish_json(self.bus.as_ref(), subjects::ACQUIRE_SUCCESS, &response).await
                {
                    error!(error = %err, "failed to publish acquire success");
                }
            }
            Err(err) => {
                warn!(
                    session_id = %request.session_id,
                    error = %err,
                    "container acquisition failed"
                );
                let response = AcquireFailure {
                    session_id: request.session_id,
                    project_id: Some(request.project_id),
                    reason: err.to_string(),
                };
                if let Err(err) =
                    publish_json(self.bus.as_ref(), subjects::ACQUIRE_FAILURE, &response).await
                {
                    error!(error = %err, "failed to publish acquire failure");
                }
            }
        }
    }

    /// Release the session's container and acknowledge.
    ///
    /// Idempotent by construction: release delegates to eviction, which
    /// tolerates an absent entry.
    pub async fn handle_cleanup(&self, request: CleanupRequest) {
        info!(
            session_id = %request.session_id,
            container_id = %request.container_id,
            "cleanup request received"
        );

        self.pool.release(&request.session_id).await;

        let ack = CleanupAck {
            session_id: request.session_id,
            container_id: request.container_id,
        };
        if let Err(err) = publish_json(self.bus.as_ref(), subjects::CLEANUP_ACK, &ack).await {
            warn!(error = %err, "failed to publish cleanup ack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerEngineApi, EngineError, EngineResult, SandboxSpec};
    use crate::pool::PoolConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use warren_protocol::InProcessBus;

    #[derive(Default)]
    struct FakeEngine {
        fail_create: AtomicBool,
    }

    #[async_trait]
    impl ContainerEngineApi for FakeEngine {
        async fn create(&self, _spec: &SandboxSpec) -> EngineResult<String> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(EngineError::CommandFailed {
                    command: "create".to_string(),
                    message: "image pull failed".to_string(),
                });
            }
            Ok("c-abc".to_string())
        }

        async fn start(&self, _container_id: &str) -> EngineResult<()> {
            Ok(())
        }

        async fn stop(&self, _container_id: &str) -> EngineResult<()> {
            Ok(())
        }

        async fn remove(&self, _container_id: &str) -> EngineResult<()> {
            Ok(())
        }
    }

    fn service_with(engine: Arc<FakeEngine>, bus: Arc<InProcessBus>) -> Arc<ExecutorService> {
        let pool = Arc::new(ContainerPool::new(
            engine,
            PoolConfig {
                image: "test-image:latest".to_string(),
                workspace_root: PathBuf::from("/tmp/warren-test"),
                inactivity_timeout: Duration::from_secs(600),
            },
        ));
        Arc::new(ExecutorService::new(pool, bus))
    }

    async fn next_json<T: serde::de::DeserializeOwned>(
        stream: &mut warren_protocol::MessageStream,
    ) -> T {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream closed");
        serde_json::from_slice(&msg.payload).expect("decoding message")
    }

    #[tokio::test]
    async fn acquire_success_is_published() {
        let bus = Arc::new(InProcessBus::new());
        let mut successes = bus.subscribe(subjects::ACQUIRE_SUCCESS).await.unwrap();
        let service = service_with(Arc::new(FakeEngine::default()), bus.clone());

        service
            .handle_acquire(AcquireRequest {
                session_id: "s-7".into(),
                project_id: "p-42".into(),
            })
            .await;

        let response: AcquireSuccess = next_json(&mut successes).await;
        assert_eq!(response.session_id, "s-7");
        assert_eq!(response.project_id, "p-42");
        assert_eq!(response.container_id, "c-abc");
    }

    #[tokio::test]
    async fn acquire_failure_is_published_with_reason() {
        let bus = Arc::new(InProcessBus::new());
        let mut failures = bus.subscribe(subjects::ACQUIRE_FAILURE).await.unwrap();
        let engine = Arc::new(FakeEngine::default());
        engine.fail_create.store(true, Ordering::SeqCst);
        let service = service_with(engine, bus.clone());

        service
            .handle_acquire(AcquireRequest {
                session_id: "s-7".into(),
                project_id: "p-42".into(),
            })
            .await;

        let response: AcquireFailure = next_json(&mut failures).await;
        assert_eq!(response.session_id, "s-7");
        assert!(response.reason.contains("image pull failed"));
    }

    #[tokio::test]
    async fn cleanup_is_acknowledged_even_when_entry_is_absent() {
        let bus = Arc::new(InProcessBus::new());
        let mut acks = bus.subscribe(subjects::CLEANUP_ACK).await.unwrap();
        let service = service_with(Arc::new(FakeEngine::default()), bus.clone());

        // No prior acquire: the pool has no entry for this session.
        service
            .handle_cleanup(CleanupRequest {
                session_id: "s-9".into(),
                project_id: "p-1".into(),
                container_id: "c-gone".into(),
            })
            .await;

        let ack: CleanupAck = next_json(&mut acks).await;
        assert_eq!(ack.session_id, "s-9");
        assert_eq!(ack.container_id, "c-gone");
    }

    #[tokio::test]
    async fn acquire_loop_answers_requests_from_the_bus() {
        let bus = Arc::new(InProcessBus::new());
        let mut successes = bus.subscribe(subjects::ACQUIRE_SUCCESS).await.unwrap();
        let service = service_with(Arc::new(FakeEngine::default()), bus.clone());

        let _loop_task = tokio::spawn(service.clone().run_acquire_loop());
        // Give the loop a moment to subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        publish_json(
            bus.as_ref(),
            subjects::ACQUIRE_REQUEST,
            &AcquireRequest {
                session_id: "s-1".into(),
                project_id: "p-1".into(),
            },
        )
        .await
        .unwrap();

        let response: AcquireSuccess = next_json(&mut successes).await;
        assert_eq!(response.session_id, "s-1");
        assert_eq!(response.container_id, "c-abc");
    }
}
