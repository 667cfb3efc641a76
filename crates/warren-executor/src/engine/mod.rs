//! Container engine client.
//!
//! Drives sandbox containers via the Docker or Podman CLI. The engine is
//! auto-detected or configured explicitly. Only the four lifecycle
//! primitives the pool needs are exposed; everything else the CLI can do is
//! out of scope here.

mod error;
mod spec;

pub use error::{EngineError, EngineResult};
pub use spec::{SandboxSpec, WORKSPACE_MOUNT, validate_image_name};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Container engine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Docker engine (default for macOS/Windows dev)
    Docker,
    /// Podman engine (default for Linux prod)
    #[default]
    Podman,
}

impl EngineType {
    /// Get the default binary name for this engine.
    pub fn default_binary(&self) -> &'static str {
        match self {
            EngineType::Docker => "docker",
            EngineType::Podman => "podman",
        }
    }

    /// Whether this engine requires SELinux volume labels (:Z suffix).
    pub fn needs_selinux_labels(&self) -> bool {
        match self {
            EngineType::Docker => false,
            EngineType::Podman => true,
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineType::Docker => write!(f, "docker"),
            EngineType::Podman => write!(f, "podman"),
        }
    }
}

/// Validate a container ID or name.
///
/// Container IDs are hex strings (12 or 64 chars); names follow the same
/// rules as container creation.
fn validate_container_id_or_name(id: &str) -> EngineResult<()> {
    if id.is_empty() {
        return Err(EngineError::InvalidInput(
            "container ID or name cannot be empty".to_string(),
        ));
    }

    if id.len() > 128 {
        return Err(EngineError::InvalidInput(
            "container ID or name exceeds maximum length".to_string(),
        ));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !id.chars().all(valid_chars) {
        return Err(EngineError::InvalidInput(format!(
            "container ID or name '{id}' contains invalid characters"
        )));
    }

    Ok(())
}

/// Engine client seam.
///
/// `stop`/`remove` report [`EngineError::NotFound`] for an absent container;
/// callers treat that as benign (the work is already done).
#[async_trait]
pub trait ContainerEngineApi: Send + Sync {
    /// Create a container and return its id. Does not start it.
    async fn create(&self, spec: &SandboxSpec) -> EngineResult<String>;

    /// Start a created container.
    async fn start(&self, container_id: &str) -> EngineResult<()>;

    /// Stop a running container.
    async fn stop(&self, container_id: &str) -> EngineResult<()>;

    /// Remove a stopped container.
    async fn remove(&self, container_id: &str) -> EngineResult<()>;
}

/// CLI-backed engine client supporting Docker and Podman.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    engine_type: EngineType,
    binary: String,
}

impl Default for ContainerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine {
    /// Create a new engine client with auto-detection.
    ///
    /// Prefers Podman on Linux, falls back to Docker.
    pub fn new() -> Self {
        if Self::is_binary_available("podman") {
            Self {
                engine_type: EngineType::Podman,
                binary: "podman".to_string(),
            }
        } else if Self::is_binary_available("docker") {
            Self {
                engine_type: EngineType::Docker,
                binary: "docker".to_string(),
            }
        } else {
            // Fall back to podman, will fail at first use.
            Self {
                engine_type: EngineType::Podman,
                binary: "podman".to_string(),
            }
        }
    }

    /// Create an engine client with a specific type.
    pub fn with_type(engine_type: EngineType) -> Self {
        Self {
            binary: engine_type.default_binary().to_string(),
            engine_type,
        }
    }

    /// Get the engine type.
    pub fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    /// Check if a binary is available in PATH.
    fn is_binary_available(name: &str) -> bool {
        std::process::Command::new("which")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Check if the engine is available and working.
    pub async fn health_check(&self) -> EngineResult<String> {
        let output = Command::new(&self.binary)
            .args(["version", "--format", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::CommandFailed {
                command: "version".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed {
                command: "version".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Classify a failed command: recognize "container is already gone".
    fn command_error(command: &str, container_id: &str, stderr: &str) -> EngineError {
        let lowered = stderr.to_lowercase();
        // docker: "No such container: <id>"
        // podman: "no container with name or ID \"<id>\" found"
        if lowered.contains("no such container") || lowered.contains("no container with") {
            return EngineError::NotFound(container_id.to_string());
        }
        EngineError::CommandFailed {
            command: command.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

#[async_trait]
impl ContainerEngineApi for ContainerEngine {
    async fn create(&self, spec: &SandboxSpec) -> EngineResult<String> {
        // Validate all inputs before shelling out.
        spec.validate()?;

        let mut owned_args: Vec<String> = Vec::new();

        owned_args.push("create".to_string());
        owned_args.push("--name".to_string());
        owned_args.push(spec.name.clone());

        // Volume mounts, with SELinux labels for Podman.
        for (host, container) in &spec.volumes {
            owned_args.push("-v".to_string());
            if self.engine_type.needs_selinux_labels() {
                owned_args.push(format!("{host}:{container}:Z"));
            } else {
                owned_args.push(format!("{host}:{container}"));
            }
        }

        for (key, value) in &spec.env {
            owned_args.push("-e".to_string());
            owned_args.push(format!("{key}={value}"));
        }

        if let Some(ref workdir) = spec.workdir {
            owned_args.push("-w".to_string());
            owned_args.push(workdir.clone());
        }

        owned_args.push(spec.image.clone());

        for cmd in &spec.command {
            owned_args.push(cmd.clone());
        }

        let output = Command::new(&self.binary)
            .args(&owned_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::CommandFailed {
                command: "create".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed {
                command: "create".to_string(),
                message: stderr.trim().to_string(),
            });
        }

        // The CLI prints the container ID.
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn start(&self, container_id: &str) -> EngineResult<()> {
        validate_container_id_or_name(container_id)?;

        let output = Command::new(&self.binary)
            .args(["start", container_id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::CommandFailed {
                command: "start".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::command_error("start", container_id, &stderr));
        }

        Ok(())
    }

    async fn stop(&self, container_id: &str) -> EngineResult<()> {
        validate_container_id_or_name(container_id)?;

        let output = Command::new(&self.binary)
            .args(["stop", "-t", "5", container_id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::CommandFailed {
                command: "stop".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::command_error("stop", container_id, &stderr));
        }

        Ok(())
    }

    async fn remove(&self, container_id: &str) -> EngineResult<()> {
        validate_container_id_or_name(container_id)?;

        let output = Command::new(&self.binary)
            .args(["rm", "-f", container_id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::CommandFailed {
                command: "rm".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::command_error("rm", container_id, &stderr));
        }

        Ok(())
    }
}
