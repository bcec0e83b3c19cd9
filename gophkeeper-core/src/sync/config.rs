//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, VaultError};

/// Settings for one local vault profile and the server it syncs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
    pub operation_timeout_secs: u64,
    /// Payloads at or above this size are written to `blob_dir`.
    pub inline_blob_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            database_path: PathBuf::from("gophkeeper.db"),
            blob_dir: PathBuf::from("blobs"),
            operation_timeout_secs: 30,
            inline_blob_limit: 4096,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Config with the database and blob directory placed under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            database_path: dir.join("gophkeeper.db"),
            blob_dir: dir.join("blobs"),
            ..Self::default()
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
