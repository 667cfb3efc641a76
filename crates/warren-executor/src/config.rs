//! Executor configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::engine::EngineType;
use crate::pool::PoolConfig;

/// Executor service configuration.
///
/// Loaded from a TOML file with `WARREN_EXECUTOR_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// Workspace image for sandbox containers.
    pub image: String,
    /// Host directory holding per-project working directories.
    pub workspace_root: PathBuf,
    /// Evict pool entries unused for this many minutes.
    pub inactivity_timeout_minutes: u64,
    /// How often the pool housekeeping task runs, in seconds.
    pub housekeeping_interval_seconds: u64,
    /// Explicit engine selection; auto-detected when unset.
    pub engine: Option<EngineType>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://127.0.0.1:4222".to_string(),
            image: "warren-sandbox:latest".to_string(),
            workspace_root: PathBuf::from("/srv/warren/workspaces"),
            inactivity_timeout_minutes: 10,
            housekeeping_interval_seconds: 60,
            engine: None,
        }
    }
}

impl ExecutorConfig {
    /// Load configuration, layering file and environment over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            ),
            None => builder.add_source(File::with_name("warren-executor").required(false)),
        };

        let cfg = builder
            .add_source(Environment::with_prefix("WARREN_EXECUTOR").separator("__"))
            .build()
            .context("building executor configuration")?;

        cfg.try_deserialize()
            .context("deserializing executor configuration")
    }

    /// Derive the pool configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            image: self.image.clone(),
            workspace_root: self.workspace_root.clone(),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_minutes * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.inactivity_timeout_minutes, 10);
        assert_eq!(
            cfg.pool_config().inactivity_timeout,
            Duration::from_secs(600)
        );
        assert!(cfg.engine.is_none());
    }

    #[test]
    fn load_reads_toml_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "image = \"custom:dev\"\ninactivity_timeout_minutes = 3\nengine = \"docker\""
        )
        .unwrap();

        let cfg = ExecutorConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.image, "custom:dev");
        assert_eq!(cfg.inactivity_timeout_minutes, 3);
        assert_eq!(cfg.engine, Some(EngineType::Docker));
        // Untouched fields keep their defaults.
        assert_eq!(cfg.nats_url, "nats://127.0.0.1:4222");
    }
}
