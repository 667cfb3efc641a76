use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's editing session within a project workspace.
///
/// `container_id` is NULL from the moment the session row is written
/// until the executor reports a container for it. A session that keeps
/// a NULL `container_id` past the acquire exchange is either waiting or
/// was closed mid-acquire.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub container_id: Option<String>,
    pub created_at: String,
    pub last_activity_at: String,
}

impl Session {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        // Whole-second UTC keeps the column in one canonical shape that
        // SQLite's datetime() parses.
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            container_id: None,
            created_at: now.clone(),
            last_activity_at: now,
        }
    }
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Inactive,
    Deleting,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Inactive => "inactive",
            ProjectStatus::Deleting => "deleting",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "inactive" => Ok(ProjectStatus::Inactive),
            "deleting" => Ok(ProjectStatus::Deleting),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

impl TryFrom<String> for ProjectStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub status: ProjectStatus,
    pub created_at: String,
}
