//! Session orchestration.
//!
//! Owns the session lifecycle end to end: open inserts a row and asks the
//! executor for a container, the acquire responses bind or discard the row,
//! and close/reap tear the session down through the same cleanup path. The
//! orchestrator never talks to the container engine; everything it knows
//! about containers arrives as messages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info, warn};

use warren_protocol::{
    AcquireFailure, AcquireRequest, AcquireSuccess, CleanupRequest, MessageBus, publish_json,
    subjects,
};

use crate::project::ProjectDirectory;
use crate::session::models::Session;
use crate::session::repository::SessionRepository;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user {user_id} is not a member of project {project_id}")]
    PermissionDenied { user_id: String, project_id: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct SessionOrchestrator {
    sessions: SessionRepository,
    projects: Arc<dyn ProjectDirectory>,
    bus: Arc<dyn MessageBus>,
}

impl SessionOrchestrator {
    pub fn new(
        sessions: SessionRepository,
        projects: Arc<dyn ProjectDirectory>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            sessions,
            projects,
            bus,
        }
    }

    /// Open a session for a project member and request a container.
    ///
    /// Returns as soon as the row is written and the request is on the
    /// wire; the container arrives later via [`handle_acquire_success`].
    ///
    /// [`handle_acquire_success`]: SessionOrchestrator::handle_acquire_success
    pub async fn open_session(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<String, SessionError> {
        let is_member = self
            .projects
            .has_membership(user_id, project_id)
            .await
            .context("checking project membership")?;
        if !is_member {
            return Err(SessionError::PermissionDenied {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
            });
        }

        let session = Session::new(project_id, user_id);
        self.sessions
            .create(&session)
            .await
            .context("persisting session")?;

        let request = AcquireRequest {
            session_id: session.id.clone(),
            project_id: project_id.to_string(),
        };
        publish_json(self.bus.as_ref(), subjects::ACQUIRE_REQUEST, &request)
            .await
            .context("publishing acquire request")?;

        info!(
            session_id = %session.id,
            project_id = %project_id,
            user_id = %user_id,
            "session opened, container requested"
        );
        Ok(session.id)
    }

    /// Bind the reported container to its session.
    ///
    /// When the session row is gone the container is an orphan: the
    /// session was closed while the executor was still creating it. The
    /// repair is a compensating cleanup request; the row is never
    /// re-created.
    pub async fn handle_acquire_success(&self, msg: AcquireSuccess) -> Result<()> {
        let bound = self
            .sessions
            .bind_container(&msg.session_id, &msg.container_id)
            .await?;

        if !bound {
            warn!(
                session_id = %msg.session_id,
                container_id = %msg.container_id,
                "container arrived for a closed session, requesting cleanup"
            );
            let cleanup = CleanupRequest {
                session_id: msg.session_id,
                project_id: msg.project_id,
                container_id: msg.container_id,
            };
            publish_json(self.bus.as_ref(), subjects::CLEANUP_REQUEST, &cleanup)
                .await
                .context("publishing orphan cleanup request")?;
            return Ok(());
        }

        self.projects
            .activate(&msg.project_id)
            .await
            .context("activating project")?;

        info!(
            session_id = %msg.session_id,
            project_id = %msg.project_id,
            container_id = %msg.container_id,
            "container bound to session"
        );
        Ok(())
    }

    /// Discard the session the executor could not back with a container.
    pub async fn handle_acquire_failure(&self, msg: AcquireFailure) -> Result<()> {
        let existed = self.sessions.delete(&msg.session_id).await?;
        if existed {
            warn!(
                session_id = %msg.session_id,
                reason = %msg.reason,
                "container acquisition failed, session discarded"
            );
        } else {
            // Already closed or reaped; the failure is moot.
            info!(
                session_id = %msg.session_id,
                reason = %msg.reason,
                "acquire failure for unknown session"
            );
        }
        Ok(())
    }

    /// Close a session and release its container.
    ///
    /// Fire-and-forget: the row is deleted before the cleanup request is
    /// published, and nothing waits for the executor's ack. Closing an
    /// unknown session is a no-op, which makes close and reap safe to
    /// race.
    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        let Some(session) = self.sessions.take(session_id).await? else {
            info!(session_id = %session_id, "close for unknown session, ignoring");
            return Ok(());
        };

        if let Some(container_id) = &session.container_id {
            let cleanup = CleanupRequest {
                session_id: session.id.clone(),
                project_id: session.project_id.clone(),
                container_id: container_id.clone(),
            };
            publish_json(self.bus.as_ref(), subjects::CLEANUP_REQUEST, &cleanup)
                .await
                .context("publishing cleanup request")?;
        }

        let remaining = self
            .sessions
            .count_for_project(&session.project_id)
            .await?;
        if remaining == 0 {
            self.projects
                .deactivate(&session.project_id)
                .await
                .context("deactivating project")?;
        }

        info!(
            session_id = %session.id,
            project_id = %session.project_id,
            container_bound = session.container_id.is_some(),
            "session closed"
        );
        Ok(())
    }

    /// Close every session idle past the threshold.
    ///
    /// Each session is closed independently; one failure does not stop
    /// the sweep. Returns the number of sessions closed.
    pub async fn reap_idle_sessions(&self, idle_minutes: i64) -> Result<usize> {
        let idle = self.sessions.list_idle_sessions(idle_minutes).await?;
        let mut reaped = 0;

        for session in idle {
            info!(
                session_id = %session.id,
                last_activity_at = %session.last_activity_at,
                "reaping idle session"
            );
            match self.close_session(&session.id).await {
                Ok(()) => reaped += 1,
                Err(err) => {
                    error!(session_id = %session.id, error = %err, "failed to reap session");
                }
            }
        }

        Ok(reaped)
    }

    /// Spawn the periodic idle sweep.
    pub fn start_idle_reaper(
        self: Arc<Self>,
        idle_minutes: i64,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.reap_idle_sessions(idle_minutes).await {
                    Ok(0) => {}
                    Ok(reaped) => info!(reaped, "idle sweep finished"),
                    Err(err) => error!(error = %err, "idle sweep failed"),
                }
            }
        })
    }
}
