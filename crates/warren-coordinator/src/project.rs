use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::session::models::{Project, ProjectStatus};

/// Project membership and activation state.
///
/// The orchestrator only needs these three operations; everything else
/// about projects lives elsewhere.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn has_membership(&self, user_id: &str, project_id: &str) -> Result<bool>;
    async fn activate(&self, project_id: &str) -> Result<()>;
    async fn deactivate(&self, project_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteProjectDirectory {
    pool: SqlitePool,
}

impl SqliteProjectDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_project(&self, id: &str, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, name, status, created_at)
             VALUES (?, ?, 'inactive', datetime('now'))",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await
        .context("inserting project")?;
        Ok(())
    }

    pub async fn add_member(&self, project_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("inserting project member")?;
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, status, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching project")?;
        Ok(project)
    }

    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(project_id)
            .execute(&self.pool)
            .await
            .context("updating project status")?;
        Ok(())
    }
}

#[async_trait]
impl ProjectDirectory for SqliteProjectDirectory {
    async fn has_membership(&self, user_id: &str, project_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM project_members WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("checking project membership")?;
        Ok(row.is_some())
    }

    async fn activate(&self, project_id: &str) -> Result<()> {
        self.set_status(project_id, ProjectStatus::Active).await
    }

    async fn deactivate(&self, project_id: &str) -> Result<()> {
        self.set_status(project_id, ProjectStatus::Inactive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn membership_and_status_transitions() {
        let db = Database::in_memory().await.unwrap();
        let dir = SqliteProjectDirectory::new(db.pool().clone());

        dir.create_project("proj-1", "Demo").await.unwrap();
        dir.add_member("proj-1", "user-1").await.unwrap();

        assert!(dir.has_membership("user-1", "proj-1").await.unwrap());
        assert!(!dir.has_membership("user-2", "proj-1").await.unwrap());

        let project = dir.get_project("proj-1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Inactive);

        dir.activate("proj-1").await.unwrap();
        let project = dir.get_project("proj-1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Active);

        dir.deactivate("proj-1").await.unwrap();
        let project = dir.get_project("proj-1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Inactive);
    }
}
