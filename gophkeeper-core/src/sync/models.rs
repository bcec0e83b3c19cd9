//! Sync bookkeeping types for the local cache.

use serde::{Deserialize, Serialize};

/// Sync state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    #[default]
    Pending,
    Conflict,
}

impl SyncState {
    /// Convert sync state to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }

    /// Parse a sync state from its string representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            "conflict" => Self::Conflict,
            _ => Self::Pending,
        }
    }
}

/// Outcome counters of a batch sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub pushed: u64,
    pub pulled: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub conflicts: u64,
}
