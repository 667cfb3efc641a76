//! Concurrent container pool.
//!
//! Maps session ids to live container ids. A miss runs the creation routine
//! exactly once per key, even under concurrent calls; entries unused for the
//! inactivity window are evicted, which stops and removes the container.
//! The pool is the only component that calls `stop`/`remove`, so no two
//! code paths can race on the same container's teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use moka::future::Cache;
use moka::notification::{ListenerFuture, RemovalCause};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{ContainerEngineApi, SandboxSpec};

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Container create/start failed; anything partially created was rolled
    /// back. Not retried here, the caller must re-initiate the acquire.
    #[error("container creation failed: {0}")]
    CreationFailed(String),
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workspace image for sandbox containers.
    pub image: String,
    /// Host directory holding per-project working directories.
    pub workspace_root: PathBuf,
    /// Evict entries unused for this long.
    pub inactivity_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            image: "warren-sandbox:latest".to_string(),
            workspace_root: PathBuf::from("/srv/warren/workspaces"),
            inactivity_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Session-keyed cache of running containers.
pub struct ContainerPool {
    entries: Cache<String, String>,
    engine: Arc<dyn ContainerEngineApi>,
    config: PoolConfig,
}

impl ContainerPool {
    /// Create a pool over the given engine client.
    pub fn new(engine: Arc<dyn ContainerEngineApi>, config: PoolConfig) -> Self {
        let listener_engine = engine.clone();
        let entries = Cache::builder()
            .time_to_idle(config.inactivity_timeout)
            .async_eviction_listener(
                move |session_id: Arc<String>, container_id: String, cause: RemovalCause| -> ListenerFuture {
                    let engine = listener_engine.clone();
                    async move {
                        match cause {
                            RemovalCause::Explicit => {
                                info!(session_id = %session_id, container_id = %container_id, "releasing container")
                            }
                            _ => {
                                info!(session_id = %session_id, container_id = %container_id, "evicting idle container")
                            }
                        }
                        teardown(engine.as_ref(), &container_id).await;
                    }
                    .boxed()
                },
            )
            .build();

        Self {
            entries,
            engine,
            config,
        }
    }

    /// Resolve the container backing `session_id`, creating one on a miss.
    ///
    /// A hit refreshes the entry's last-access time and issues no engine
    /// calls. On a miss the creation routine runs to completion before any
    /// concurrent caller for the same key is unblocked; a failed creation
    /// is not cached.
    pub async fn resolve(&self, session_id: &str, project_id: &str) -> PoolResult<String> {
        let spec = SandboxSpec::for_session(
            &self.config.image,
            &self.config.workspace_root,
            session_id,
            project_id,
        );
        let engine = self.engine.clone();

        self.entries
            .try_get_with(session_id.to_string(), async move {
                create_and_start(engine.as_ref(), &spec).await
            })
            .await
            .map_err(|shared: Arc<PoolError>| (*shared).clone())
    }

    /// Explicitly evict a session's container, bypassing the TTL wait.
    ///
    /// Idempotent: releasing an unknown or already-released session is a
    /// no-op.
    pub async fn release(&self, session_id: &str) {
        self.entries.invalidate(session_id).await;
        // Drive the eviction notification so the teardown has run by the
        // time we return.
        self.entries.run_pending_tasks().await;
    }

    /// Evict every live entry (best-effort drain at shutdown).
    pub async fn drain(&self) {
        let keys: Vec<Arc<String>> = self.entries.iter().map(|(key, _)| key).collect();
        if !keys.is_empty() {
            info!(count = keys.len(), "draining container pool");
        }
        for key in keys {
            self.entries.invalidate(key.as_str()).await;
        }
        self.entries.run_pending_tasks().await;
    }

    /// Process pending expirations and eviction notifications.
    pub async fn sweep(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Periodically drive TTL expiration.
    ///
    /// Returns a handle that can be used to stop the task.
    pub fn start_housekeeping(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        info!("starting pool housekeeping task (every {:?})", every);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        })
    }

    /// Whether a live entry exists for `session_id`.
    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }
}

/// Creation routine: create, then start, rolling back on any failure.
async fn create_and_start(
    engine: &dyn ContainerEngineApi,
    spec: &SandboxSpec,
) -> PoolResult<String> {
    let container_id = engine
        .create(spec)
        .await
        .map_err(|e| PoolError::CreationFailed(e.to_string()))?;

    if let Err(err) = engine.start(&container_id).await {
        warn!(
            container_id = %container_id,
            error = %err,
            "container start failed, rolling back"
        );
        teardown(engine, &container_id).await;
        return Err(PoolError::CreationFailed(err.to_string()));
    }

    debug!(container_id = %container_id, name = %spec.name, "container started");
    Ok(container_id)
}

/// Stop and remove a container, tolerating "already absent".
async fn teardown(engine: &dyn ContainerEngineApi, container_id: &str) {
    match engine.stop(container_id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            debug!(container_id = %container_id, "container already gone on stop");
        }
        Err(err) => {
            warn!(container_id = %container_id, error = %err, "container stop failed");
        }
    }

    match engine.remove(container_id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            debug!(container_id = %container_id, "container already gone on remove");
        }
        Err(err) => {
            warn!(container_id = %container_id, error = %err, "container remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineResult};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Counters {
        creates: u32,
        starts: u32,
        stops: u32,
        removes: u32,
    }

    #[derive(Default)]
    struct FakeEngine {
        counters: Mutex<Counters>,
        live: Mutex<HashSet<String>>,
        next_id: Mutex<u32>,
        fail_create: AtomicBool,
        fail_start: AtomicBool,
    }

    impl FakeEngine {
        fn counters(&self) -> (u32, u32, u32, u32) {
            let c = self.counters.lock().unwrap();
            (c.creates, c.starts, c.stops, c.removes)
        }
    }

    #[async_trait]
    impl ContainerEngineApi for FakeEngine {
        async fn create(&self, _spec: &SandboxSpec) -> EngineResult<String> {
            // Widen the race window for concurrent resolvers.
            tokio::time::sleep(Duration::from_millis(10)).await;

            if self.fail_create.load(Ordering::SeqCst) {
                return Err(EngineError::CommandFailed {
                    command: "create".to_string(),
                    message: "image pull failed".to_string(),
                });
            }

            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("c-{next}", next = *next)
            };
            self.counters.lock().unwrap().creates += 1;
            self.live.lock().unwrap().insert(id.clone());
            Ok(id)
        }

        async fn start(&self, container_id: &str) -> EngineResult<()> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(EngineError::CommandFailed {
                    command: "start".to_string(),
                    message: "oom".to_string(),
                });
            }
            if !self.live.lock().unwrap().contains(container_id) {
                return Err(EngineError::NotFound(container_id.to_string()));
            }
            self.counters.lock().unwrap().starts += 1;
            Ok(())
        }

        async fn stop(&self, container_id: &str) -> EngineResult<()> {
            if !self.live.lock().unwrap().contains(container_id) {
                return Err(EngineError::NotFound(container_id.to_string()));
            }
            self.counters.lock().unwrap().stops += 1;
            Ok(())
        }

        async fn remove(&self, container_id: &str) -> EngineResult<()> {
            if !self.live.lock().unwrap().remove(container_id) {
                return Err(EngineError::NotFound(container_id.to_string()));
            }
            self.counters.lock().unwrap().removes += 1;
            Ok(())
        }
    }

    fn pool_with(engine: Arc<FakeEngine>, ttl: Duration) -> ContainerPool {
        ContainerPool::new(
            engine,
            PoolConfig {
                image: "test-image:latest".to_string(),
                workspace_root: PathBuf::from("/tmp/warren-test"),
                inactivity_timeout: ttl,
            },
        )
    }

    #[tokio::test]
    async fn concurrent_resolves_create_one_container() {
        let engine = Arc::new(FakeEngine::default());
        let pool = Arc::new(pool_with(engine.clone(), Duration::from_secs(600)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(
                async move { pool.resolve("s-7", "p-42").await },
            ));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap());
        }

        assert_eq!(ids.len(), 1);
        let (creates, starts, _, _) = engine.counters();
        assert_eq!(creates, 1);
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn hit_returns_without_engine_calls() {
        let engine = Arc::new(FakeEngine::default());
        let pool = pool_with(engine.clone(), Duration::from_secs(600));

        let first = pool.resolve("s-1", "p-1").await.unwrap();
        let second = pool.resolve("s-1", "p-1").await.unwrap();

        assert_eq!(first, second);
        let (creates, _, _, _) = engine.counters();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn failed_creation_is_rolled_back_and_not_cached() {
        let engine = Arc::new(FakeEngine::default());
        engine.fail_start.store(true, Ordering::SeqCst);
        let pool = pool_with(engine.clone(), Duration::from_secs(600));

        let err = pool.resolve("s-1", "p-1").await.unwrap_err();
        assert!(matches!(err, PoolError::CreationFailed(_)));
        assert!(!pool.contains("s-1"));

        // Rollback removed the half-created container.
        let (_, _, stops, removes) = engine.counters();
        assert_eq!(stops, 1);
        assert_eq!(removes, 1);
        assert!(engine.live.lock().unwrap().is_empty());

        // The failure was not cached: the next resolve tries again.
        engine.fail_start.store(false, Ordering::SeqCst);
        let id = pool.resolve("s-1", "p-1").await.unwrap();
        assert!(pool.contains("s-1"));
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn create_failure_has_nothing_to_roll_back() {
        let engine = Arc::new(FakeEngine::default());
        engine.fail_create.store(true, Ordering::SeqCst);
        let pool = pool_with(engine.clone(), Duration::from_secs(600));

        let err = pool.resolve("s-1", "p-1").await.unwrap_err();
        assert!(err.to_string().contains("image pull failed"));

        let (creates, _, stops, removes) = engine.counters();
        assert_eq!(creates, 0);
        assert_eq!(stops, 0);
        assert_eq!(removes, 0);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let engine = Arc::new(FakeEngine::default());
        let pool = pool_with(engine.clone(), Duration::from_secs(600));

        pool.resolve("s-1", "p-1").await.unwrap();
        assert!(pool.contains("s-1"));

        pool.release("s-1").await;
        assert!(!pool.contains("s-1"));

        // Second release observes nothing and issues no engine calls.
        pool.release("s-1").await;

        let (_, _, stops, removes) = engine.counters();
        assert_eq!(stops, 1);
        assert_eq!(removes, 1);
    }

    #[tokio::test]
    async fn idle_entries_are_evicted() {
        let engine = Arc::new(FakeEngine::default());
        let pool = pool_with(engine.clone(), Duration::from_millis(50));

        pool.resolve("s-1", "p-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        pool.sweep().await;

        assert!(!pool.contains("s-1"));
        let (_, _, stops, removes) = engine.counters();
        assert_eq!(stops, 1);
        assert_eq!(removes, 1);
    }

    #[tokio::test]
    async fn drain_tears_down_every_entry() {
        let engine = Arc::new(FakeEngine::default());
        let pool = pool_with(engine.clone(), Duration::from_secs(600));

        pool.resolve("s-1", "p-1").await.unwrap();
        pool.resolve("s-2", "p-2").await.unwrap();

        pool.drain().await;

        assert!(!pool.contains("s-1"));
        assert!(!pool.contains("s-2"));
        let (_, _, stops, removes) = engine.counters();
        assert_eq!(stops, 2);
        assert_eq!(removes, 2);
        assert!(engine.live.lock().unwrap().is_empty());
    }
}
