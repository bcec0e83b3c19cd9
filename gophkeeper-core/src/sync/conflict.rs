//! Last-Write-Wins conflict resolution.
//!
//! The same rules decide every sync call: the server applies them to a record
//! or profile pushed by a client, and the client applies them to the server's
//! answer before writing it into the local cache.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ItemMeta, UserProfile};

/// Sync-level failures surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("record key is required")]
    NoKey,

    #[error("identity conflict for {key}: created_at differs from the stored record")]
    IdentityConflict { key: String },
}

/// The timestamps that drive reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(created_at: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            created_at,
            updated_at,
        }
    }
}

impl From<&ItemMeta> for Snapshot {
    fn from(m: &ItemMeta) -> Self {
        Self::new(m.created_at, m.updated_at)
    }
}

impl From<&UserProfile> for Snapshot {
    fn from(u: &UserProfile) -> Self {
        Self::new(u.created_at, u.updated_at)
    }
}

/// Conflict resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing stored yet: take the incoming snapshot as is.
    Adopt,
    /// Both sides carry a different creation time: not the same record.
    IdentityConflict,
    /// Same timestamps on both sides: nothing to write.
    NoOp,
    /// Incoming is newer: replace the stored values.
    Overwrite,
    /// Stored is newer or equal: reject the incoming values.
    EchoStored,
}

impl Resolution {
    /// Whether the incoming values must be persisted.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Adopt | Self::Overwrite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adopt => "adopt",
            Self::IdentityConflict => "identity_conflict",
            Self::NoOp => "no_op",
            Self::Overwrite => "overwrite",
            Self::EchoStored => "echo_stored",
        }
    }
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Decide how an incoming snapshot reconciles with the stored one.
    ///
    /// LWW rules:
    /// 1. Nothing stored: adopt.
    /// 2. Both `created_at` set and different: identity conflict.
    /// 3. `created_at` and `updated_at` equal (absent == absent): no-op.
    /// 4. Stored has no `created_at`, or incoming `updated_at` is set and
    ///    strictly after the stored one (or the stored one is absent): overwrite.
    /// 5. Otherwise keep the stored snapshot.
    pub fn resolve(incoming: Snapshot, stored: Option<Snapshot>) -> Resolution {
        let Some(stored) = stored else {
            return Resolution::Adopt;
        };

        if let (Some(a), Some(b)) = (incoming.created_at, stored.created_at) {
            if a != b {
                return Resolution::IdentityConflict;
            }
        }

        if incoming.created_at == stored.created_at && incoming.updated_at == stored.updated_at {
            return Resolution::NoOp;
        }

        let newer = match (incoming.updated_at, stored.updated_at) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if stored.created_at.is_none() || newer {
            Resolution::Overwrite
        } else {
            Resolution::EchoStored
        }
    }

    /// [`resolve`](Self::resolve) with the conflict outcome turned into an error.
    pub fn check(
        key: &str,
        incoming: Snapshot,
        stored: Option<Snapshot>,
    ) -> Result<Resolution, SyncError> {
        match Self::resolve(incoming, stored) {
            Resolution::IdentityConflict => Err(SyncError::IdentityConflict {
                key: key.to_string(),
            }),
            other => Ok(other),
        }
    }
}
