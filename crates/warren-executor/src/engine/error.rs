//! Container engine error types.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine command failed.
    #[error("container {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The referenced container does not exist.
    ///
    /// Benign for `stop`/`remove`: a stale reference means the work is
    /// already done.
    #[error("container not found: {0}")]
    NotFound(String),

    /// No container engine binary available.
    #[error("no container engine available (docker or podman)")]
    NoEngineAvailable,

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether this error means the target container is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}
