//! Server storage model types.

use chrono::{DateTime, Utc};
use gophkeeper_core::UserProfile;

/// A user row. `password_hash` is an Argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub description: Option<String>,
    pub packed_key: Option<Vec<u8>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    /// Wire view of the user; the password is never included.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            email: self.email.clone(),
            password: None,
            description: self.description.clone(),
            packed_key: self.packed_key.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// An issued client token. Only the SHA-256 digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub token_id: String,
    pub token_hash: String,
    pub user_id: i64,
    /// Unix seconds.
    pub expires_at: i64,
    pub issued_at: i64,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}
