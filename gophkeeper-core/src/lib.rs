//! GophKeeper core library
//!
//! Shared building blocks for the vault client and the sync server:
//! payload encryption, the record model, the wire schema, the local cache
//! and the reconciliation rules run on every sync call.

pub mod crypto;
pub mod database;
pub mod models;
pub mod payload;
pub mod proto;
pub mod sync;

pub use crypto::{decrypt, encrypt, hash_password, verify_password, CryptoError, VaultKey};
pub use database::{LocalItem, LocalStore};
pub use models::{DataItem, ItemMeta, ItemSummary, ListQuery, OrderBy, UserProfile};
pub use payload::{Payload, PayloadKind};
pub use proto::ErrorCode;
pub use sync::{ClientConfig, ConflictResolver, Resolution, SyncError, SyncState};

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Sync identity conflict for key {key}")]
    SyncConflict { key: String },

    #[error("Server error {code}: {message}")]
    Remote { code: ErrorCode, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<SyncError> for VaultError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::IdentityConflict { key } => Self::SyncConflict { key },
            SyncError::NoKey => Self::InvalidInput("record key is empty".to_string()),
        }
    }
}
