//! Sandbox container specification and input validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};

/// Everything the engine needs to create one sandbox container.
///
/// Built per acquire request: the workspace image, the per-project working
/// directory bind mount, and a long-lived placeholder command that keeps the
/// container alive until it is explicitly removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Container name, derived from the session id.
    pub name: String,
    /// Workspace image to run.
    pub image: String,
    /// Command keeping the container alive.
    pub command: Vec<String>,
    /// Bind mounts (host path -> container path).
    pub volumes: Vec<(String, String)>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Working directory inside the container.
    pub workdir: Option<String>,
}

/// Container-side mount point for the project working directory.
pub const WORKSPACE_MOUNT: &str = "/workspace";

impl SandboxSpec {
    /// Build the spec for one session's sandbox.
    ///
    /// The project working directory `<workspace_root>/<project_id>` is bind
    /// mounted at [`WORKSPACE_MOUNT`]; the placeholder command sleeps until
    /// teardown.
    pub fn for_session(
        image: &str,
        workspace_root: &Path,
        session_id: &str,
        project_id: &str,
    ) -> Self {
        let host_dir: PathBuf = workspace_root.join(project_id);
        Self {
            name: format!("warren-{session_id}"),
            image: image.to_string(),
            command: vec!["sleep".to_string(), "infinity".to_string()],
            volumes: vec![(
                host_dir.to_string_lossy().into_owned(),
                WORKSPACE_MOUNT.to_string(),
            )],
            env: BTreeMap::new(),
            workdir: Some(WORKSPACE_MOUNT.to_string()),
        }
    }

    /// Validate all fields before shelling out to the engine.
    pub fn validate(&self) -> EngineResult<()> {
        validate_image_name(&self.image)?;
        validate_container_name(&self.name)?;

        if self.command.is_empty() {
            return Err(EngineError::InvalidInput(
                "container command cannot be empty".to_string(),
            ));
        }

        for key in self.env.keys() {
            validate_env_var_key(key)?;
        }

        for (host_path, container_path) in &self.volumes {
            validate_volume_path(host_path, "host")?;
            validate_volume_path(container_path, "container")?;
        }

        if let Some(ref workdir) = self.workdir {
            validate_container_path(workdir)?;
        }

        Ok(())
    }
}

/// Validate an OCI image name: `[registry/][namespace/]name[:tag][@digest]`.
pub fn validate_image_name(image: &str) -> EngineResult<()> {
    if image.is_empty() {
        return Err(EngineError::InvalidInput(
            "image name cannot be empty".to_string(),
        ));
    }

    if image.len() > 256 {
        return Err(EngineError::InvalidInput(
            "image name exceeds maximum length of 256 characters".to_string(),
        ));
    }

    let valid_chars = |c: char| {
        c.is_ascii_alphanumeric()
            || c == '.'
            || c == '-'
            || c == '_'
            || c == '/'
            || c == ':'
            || c == '@'
    };

    if !image.chars().all(valid_chars) {
        return Err(EngineError::InvalidInput(format!(
            "image name '{image}' contains invalid characters; only alphanumeric, '.', '-', '_', '/', ':', '@' are allowed"
        )));
    }

    if image.contains("..") {
        return Err(EngineError::InvalidInput(
            "image name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}

/// Validate a container name: alphanumeric with hyphens and underscores.
fn validate_container_name(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidInput(
            "container name cannot be empty".to_string(),
        ));
    }

    if name.len() > 128 {
        return Err(EngineError::InvalidInput(
            "container name exceeds maximum length of 128 characters".to_string(),
        ));
    }

    let first_char = name.chars().next().unwrap();
    if !first_char.is_ascii_alphanumeric() && first_char != '_' {
        return Err(EngineError::InvalidInput(
            "container name must start with an alphanumeric character or underscore".to_string(),
        ));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !name.chars().all(valid_chars) {
        return Err(EngineError::InvalidInput(format!(
            "container name '{name}' contains invalid characters; only alphanumeric, '-', '_' are allowed"
        )));
    }

    Ok(())
}

/// Validate an environment variable key per POSIX conventions.
fn validate_env_var_key(key: &str) -> EngineResult<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidInput(
            "environment variable key cannot be empty".to_string(),
        ));
    }

    let first_char = key.chars().next().unwrap();
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(EngineError::InvalidInput(format!(
            "environment variable key '{key}' must start with a letter or underscore"
        )));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if !key.chars().all(valid_chars) {
        return Err(EngineError::InvalidInput(format!(
            "environment variable key '{key}' contains invalid characters; only alphanumeric and '_' are allowed"
        )));
    }

    Ok(())
}

/// Validate a volume path (host or container side).
fn validate_volume_path(path: &str, side: &str) -> EngineResult<()> {
    if path.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{side} volume path cannot be empty"
        )));
    }

    if path.contains('\0') {
        return Err(EngineError::InvalidInput(format!(
            "{side} volume path cannot contain null bytes"
        )));
    }

    // Shell metacharacters never belong in a mount path.
    let dangerous_chars = [
        '$', '`', '!', '&', '|', ';', '<', '>', '(', ')', '{', '}', '[', ']', '*', '?', '\\', '"',
        '\'', '\n', '\r',
    ];
    for c in dangerous_chars.iter() {
        if path.contains(*c) {
            return Err(EngineError::InvalidInput(format!(
                "{side} volume path contains dangerous character '{c}'"
            )));
        }
    }

    Ok(())
}

/// Validate a container-internal path.
fn validate_container_path(path: &str) -> EngineResult<()> {
    if path.is_empty() {
        return Err(EngineError::InvalidInput(
            "container path cannot be empty".to_string(),
        ));
    }

    if !path.starts_with('/') {
        return Err(EngineError::InvalidInput(
            "container path must be absolute (start with '/')".to_string(),
        ));
    }

    if path.contains('\0') {
        return Err(EngineError::InvalidInput(
            "container path cannot contain null bytes".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_for_session_mounts_project_dir() {
        let spec = SandboxSpec::for_session(
            "warren-sandbox:latest",
            Path::new("/srv/workspaces"),
            "s-7",
            "p-42",
        );
        assert_eq!(spec.name, "warren-s-7");
        assert_eq!(
            spec.volumes,
            vec![("/srv/workspaces/p-42".to_string(), "/workspace".to_string())]
        );
        assert_eq!(spec.command, vec!["sleep", "infinity"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_image_name_accepts_common_forms() {
        assert!(validate_image_name("ubuntu:latest").is_ok());
        assert!(validate_image_name("library/nginx").is_ok());
        assert!(validate_image_name("gcr.io/project/image@sha256:abc123").is_ok());
    }

    #[test]
    fn validate_image_name_rejects_injection() {
        assert!(validate_image_name("").is_err());
        assert!(validate_image_name("image with spaces").is_err());
        assert!(validate_image_name("image;rm -rf /").is_err());
        assert!(validate_image_name("../escape").is_err());
    }

    #[test]
    fn validate_rejects_bad_volume_paths() {
        let mut spec = SandboxSpec::for_session(
            "warren-sandbox:latest",
            Path::new("/srv/workspaces"),
            "s-1",
            "p-1",
        );
        spec.volumes = vec![("/srv/$(whoami)".to_string(), "/workspace".to_string())];
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_workdir() {
        let mut spec = SandboxSpec::for_session(
            "warren-sandbox:latest",
            Path::new("/srv/workspaces"),
            "s-1",
            "p-1",
        );
        spec.workdir = Some("workspace".to_string());
        assert!(spec.validate().is_err());
    }
}
