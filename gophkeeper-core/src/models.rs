//! Record, user and query models shared by the client and the server.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time truncated to microseconds, the precision kept by both stores.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Metadata common to every record representation.
///
/// Richer entities hold this by value rather than repeating the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Unique within the owner's scope; never renamed.
    pub key: String,
    pub description: Option<String>,
    /// Identity anchor. Once set it is never replaced by a sync.
    pub created_at: Option<DateTime<Utc>>,
    /// `None` means "never updated since creation".
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemMeta {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

/// A record together with its opaque encrypted payload.
///
/// `blob == None` is a soft-deleted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub meta: ItemMeta,
    pub blob: Option<Vec<u8>>,
}

impl DataItem {
    pub fn new(meta: ItemMeta, blob: Option<Vec<u8>>) -> Self {
        Self { meta, blob }
    }

    pub fn key(&self) -> &str {
        &self.meta.key
    }

    pub fn is_deleted(&self) -> bool {
        self.blob.is_none()
    }
}

/// Metadata-only listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub meta: ItemMeta,
    pub deleted: bool,
}

/// Account profile as exchanged by profile sync.
///
/// `password` is only ever set on the way in; responses blank it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub email: String,
    pub password: Option<String>,
    pub description: Option<String>,
    /// Wrapped vault key, opaque to the server.
    pub packed_key: Option<Vec<u8>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sort column for record listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderBy {
    #[default]
    Key,
    CreatedAt,
    UpdatedAt,
}

impl OrderBy {
    /// Column name used in SQL `ORDER BY` clauses.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Parse the wire spelling. Unknown names are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "key" => Some(Self::Key),
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            "updatedAt" | "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

/// Pagination and filter parameters for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
    pub order_by: OrderBy,
    pub include_deleted: bool,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    /// Build a query, clamping the limit to `1..=MAX_LIMIT`.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
            ..Self::default()
        }
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            order_by: OrderBy::Key,
            include_deleted: false,
        }
    }
}
