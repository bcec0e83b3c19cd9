//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// SQLite path, or `:memory:`.
    pub database_dsn: String,
    pub operation_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub token_ttl_days: u64,
    pub max_payload_size: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            database_dsn: "gophkeeper.db".to_string(),
            operation_timeout_secs: 5,
            shutdown_timeout_secs: 10,
            token_ttl_days: 365,
            max_payload_size: 8 * 1024 * 1024,
            cleanup_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days as i64)
    }
}
