use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::Session;

const SESSION_COLUMNS: &str =
    "id, project_id, user_id, container_id, created_at, last_activity_at";

/// Persistence layer for sessions.
///
/// Row-level guards stand in for process-level locking: concurrent
/// callers race on single UPDATE/DELETE statements and the loser
/// observes `false` or `None` instead of corrupt state.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new session row.
    pub async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, project_id, user_id, container_id, created_at, last_activity_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.project_id)
        .bind(&session.user_id)
        .bind(&session.container_id)
        .bind(&session.created_at)
        .bind(&session.last_activity_at)
        .execute(&self.pool)
        .await
        .context("inserting session")?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching session")?;
        Ok(session)
    }

    /// Delete a session row. Returns whether a row existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a container against a still-live session.
    ///
    /// Returns `false` when the session row is gone, which means the
    /// session was closed while the container was being acquired and
    /// the container is now an orphan.
    pub async fn bind_container(&self, id: &str, container_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET container_id = ?, last_activity_at = datetime('now')
             WHERE id = ?",
        )
        .bind(container_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("binding container to session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically read and delete a session.
    ///
    /// Exactly one of two racing callers gets the row; the other sees
    /// `None`. Used by close and the idle reaper so teardown for a
    /// session happens once.
    pub async fn take(&self, id: &str) -> Result<Option<Session>> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("fetching session for removal")?;

        if session.is_some() {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("deleting session")?;
        }

        tx.commit().await.context("committing session removal")?;
        Ok(session)
    }

    /// Refresh a session's activity timestamp.
    pub async fn touch_activity(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_activity_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("updating session activity")?;
        Ok(result.rows_affected() > 0)
    }

    /// List sessions idle for longer than the given number of minutes.
    ///
    /// The column holds RFC 3339 text while `datetime()` yields SQLite's
    /// space-separated form, so both sides are normalized through
    /// `datetime()` before comparing.
    pub async fn list_idle_sessions(&self, idle_minutes: i64) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE datetime(last_activity_at) < datetime('now', ? || ' minutes')
             ORDER BY datetime(last_activity_at) ASC"
        ))
        .bind(-idle_minutes)
        .fetch_all(&self.pool)
        .await
        .context("listing idle sessions")?;
        Ok(sessions)
    }

    /// Count live sessions for a project.
    pub async fn count_for_project(&self, project_id: &str) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE project_id = ?")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await
                .context("counting project sessions")?;
        Ok(count.0)
    }
}
