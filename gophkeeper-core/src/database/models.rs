//! Rows of the local record cache.

use chrono::{DateTime, Utc};

use crate::models::{ItemMeta, ItemSummary};
use crate::sync::SyncState;

/// A cached record with its sync bookkeeping, without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalItem {
    pub meta: ItemMeta,
    /// When the server last confirmed this record.
    pub sync_at: Option<DateTime<Utc>>,
    pub sync_state: SyncState,
    /// Blob file under the blob directory, for payloads stored out of line.
    pub file_name: Option<String>,
    pub deleted: bool,
}

impl From<LocalItem> for ItemSummary {
    fn from(item: LocalItem) -> Self {
        Self {
            meta: item.meta,
            deleted: item.deleted,
        }
    }
}
