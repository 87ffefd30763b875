//! Process configuration loading and validation.
//!
//! Connection settings describe the source and destination databases for
//! whichever [`Database`](crate::db::Database) implementation the embedder
//! plugs in; the checkpoint section selects the resume store.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checkpoint::FileStore;
use crate::db::CheckpointStore;
use crate::error::{ReshapeError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection settings.
    pub source: DbConfig,

    /// Destination database connection settings.
    pub destination: DbConfig,

    /// Resume checkpoint settings.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Connection settings for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

/// Resume checkpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Whether runs are resumable.
    #[serde(default)]
    pub enabled: bool,

    /// Path of the JSON checkpoint file.
    pub file: Option<PathBuf>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.source.database.is_empty() {
            return Err(ReshapeError::config("source.database is required"));
        }
        if self.source.user.is_empty() {
            return Err(ReshapeError::config("source.user is required"));
        }
        if self.destination.database.is_empty() {
            return Err(ReshapeError::config("destination.database is required"));
        }
        if self.destination.user.is_empty() {
            return Err(ReshapeError::config("destination.user is required"));
        }
        if self.source.host == self.destination.host
            && self.source.port == self.destination.port
            && self.source.database == self.destination.database
        {
            return Err(ReshapeError::config(
                "source and destination cannot be the same database",
            ));
        }
        if self.checkpoint.enabled && self.checkpoint.file.is_none() {
            return Err(ReshapeError::config(
                "checkpoint.file is required when checkpoint.enabled is set",
            ));
        }
        Ok(())
    }

    /// Open the configured checkpoint store, or `None` when resumable runs
    /// are disabled.
    pub fn checkpoint_store(&self) -> Result<Option<Arc<dyn CheckpointStore>>> {
        if !self.checkpoint.enabled {
            return Ok(None);
        }
        let path = self.checkpoint.file.as_ref().ok_or_else(|| {
            ReshapeError::config("checkpoint.file is required when checkpoint.enabled is set")
        })?;
        let store = FileStore::open(path).map_err(|err| {
            ReshapeError::connection(format!(
                "cannot open checkpoint store {}: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Some(Arc::new(store)))
    }
}
