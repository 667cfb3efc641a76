//! Coordinator configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Coordinator service configuration.
///
/// Loaded from a TOML file with `WARREN_COORDINATOR_*` environment
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// SQLite database file for the session store.
    pub database_path: PathBuf,
    /// Sessions idle past this many minutes are reaped.
    pub idle_timeout_minutes: i64,
    /// How often the idle reaper sweeps, in seconds.
    pub reap_interval_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://127.0.0.1:4222".to_string(),
            database_path: PathBuf::from("/var/lib/warren/sessions.db"),
            idle_timeout_minutes: 30,
            reap_interval_seconds: 60,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration, layering file and environment over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            ),
            None => builder.add_source(File::with_name("warren-coordinator").required(false)),
        };

        let cfg = builder
            .add_source(Environment::with_prefix("WARREN_COORDINATOR").separator("__"))
            .build()
            .context("building coordinator configuration")?;

        cfg.try_deserialize()
            .context("deserializing coordinator configuration")
    }
}
