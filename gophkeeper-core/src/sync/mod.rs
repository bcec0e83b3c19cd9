//! Record synchronization
//!
//! - Last-write-wins reconciliation shared by client and server
//! - Pending-change tracking on the client
//! - HTTP client and vault orchestration (feature `sync`)

#[cfg(feature = "sync")]
pub mod client;
pub mod config;
pub mod conflict;
#[cfg(feature = "sync")]
pub mod engine;
pub mod models;
pub mod pending;

#[cfg(feature = "sync")]
pub use client::SyncClient;
pub use config::ClientConfig;
pub use conflict::{ConflictResolver, Resolution, Snapshot, SyncError};
#[cfg(feature = "sync")]
pub use engine::VaultClient;
pub use models::{SyncReport, SyncState};
pub use pending::PendingSet;
