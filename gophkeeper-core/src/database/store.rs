//! SQLite-backed local record cache.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use crate::database::models::LocalItem;
use crate::database::schema::initialize_schema;
use crate::models::{timestamp_now, DataItem, ItemMeta, ItemSummary, ListQuery};
use crate::sync::{ClientConfig, SyncState};
use crate::{Result, VaultError};

const ITEM_COLUMNS: &str =
    "key, description, created_at, updated_at, sync_at, sync_state, file_name, \
     (blob IS NULL AND file_name IS NULL) AS deleted";

/// Client-side record cache: a metadata table plus a blob directory.
pub struct LocalStore {
    conn: Connection,
    blob_dir: PathBuf,
    inline_limit: usize,
}

impl LocalStore {
    /// Open the store described by `config`, creating files as needed.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.database_path)?;
        Self::with_connection(conn, &config.blob_dir, config.inline_blob_limit)
    }

    /// Create an in-memory store for testing
    pub fn in_memory(blob_dir: &Path, inline_limit: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, blob_dir, inline_limit)
    }

    fn with_connection(conn: Connection, blob_dir: &Path, inline_limit: usize) -> Result<Self> {
        std::fs::create_dir_all(blob_dir)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            blob_dir: blob_dir.to_path_buf(),
            inline_limit,
        })
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Fetch a record with its payload. `blob` is `None` for soft-deleted records.
    pub fn get(&self, key: &str) -> Result<DataItem> {
        let row = self
            .conn
            .query_row(
                "SELECT key, description, created_at, updated_at, file_name, blob
                 FROM items WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        ItemMeta {
                            key: row.get(0)?,
                            description: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        },
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                    ))
                },
            )
            .optional()?;

        let (meta, file_name, inline) =
            row.ok_or_else(|| VaultError::NotFound(format!("record {}", key)))?;

        let blob = match (inline, file_name) {
            (Some(bytes), _) => Some(bytes),
            (None, Some(name)) => Some(std::fs::read(self.blob_dir.join(name))?),
            (None, None) => None,
        };
        Ok(DataItem { meta, blob })
    }

    /// Fetch a record's metadata and sync bookkeeping, if present.
    pub fn get_local(&self, key: &str) -> Result<Option<LocalItem>> {
        let sql = format!("SELECT {} FROM items WHERE key = ?1", ITEM_COLUMNS);
        let item = self
            .conn
            .query_row(&sql, params![key], local_item_from_row)
            .optional()?;
        Ok(item)
    }

    /// Create or update a record from a local edit and mark it pending.
    ///
    /// A new record gets `created_at = now` unless the caller supplies one.
    /// An existing record keeps its `created_at` and gets `updated_at = now`
    /// unless the caller supplies one. Returns the stored metadata.
    pub fn save(&self, meta: &ItemMeta, payload: &[u8]) -> Result<ItemMeta> {
        if meta.key.is_empty() {
            return Err(VaultError::InvalidInput("record key is empty".to_string()));
        }

        let now = timestamp_now();
        let existing = self.get_local(&meta.key)?;

        let stored = match &existing {
            None => ItemMeta {
                key: meta.key.clone(),
                description: meta.description.clone(),
                created_at: Some(meta.created_at.unwrap_or(now)),
                updated_at: meta.updated_at,
            },
            Some(row) => ItemMeta {
                key: meta.key.clone(),
                description: meta.description.clone(),
                created_at: Some(row.meta.created_at.or(meta.created_at).unwrap_or(now)),
                updated_at: Some(meta.updated_at.unwrap_or(now)),
            },
        };

        let old_file = existing.as_ref().and_then(|r| r.file_name.as_deref());
        let sync_at = existing.as_ref().and_then(|r| r.sync_at);
        self.write_row(&stored, Some(payload), old_file, SyncState::Pending, sync_at)?;

        tracing::debug!(key = %stored.key, "saved record");
        Ok(stored)
    }

    /// Soft-delete a record: drop its payload, keep its metadata.
    pub fn delete(&self, key: &str) -> Result<ItemMeta> {
        let existing = self
            .get_local(key)?
            .ok_or_else(|| VaultError::NotFound(format!("record {}", key)))?;

        let mut meta = existing.meta;
        meta.updated_at = Some(timestamp_now());
        self.write_row(
            &meta,
            None,
            existing.file_name.as_deref(),
            SyncState::Pending,
            existing.sync_at,
        )?;

        tracing::debug!(key = %key, "deleted record");
        Ok(meta)
    }

    /// Write a record exactly as confirmed by the server and mark it synced.
    pub fn store_synced(&self, item: &DataItem, at: DateTime<Utc>) -> Result<()> {
        let old_file = self.get_local(item.key())?.and_then(|r| r.file_name);
        self.write_row(
            &item.meta,
            item.blob.as_deref(),
            old_file.as_deref(),
            SyncState::Synced,
            Some(at),
        )
    }

    /// Metadata-only page of records plus the total matching the filter.
    pub fn list(&self, query: &ListQuery) -> Result<(Vec<ItemSummary>, u64)> {
        let sql = format!(
            "SELECT {} FROM items
             WHERE ?1 OR NOT (blob IS NULL AND file_name IS NULL)
             ORDER BY {}, key
             LIMIT ?2 OFFSET ?3",
            ITEM_COLUMNS,
            query.order_by.column()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![query.include_deleted, query.limit, query.offset],
                local_item_from_row,
            )?
            .map(|r| r.map(ItemSummary::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = self.count(query)?;
        Ok((items, total))
    }

    /// Number of records matching the filter of `query`, ignoring pagination.
    pub fn count(&self, query: &ListQuery) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE ?1 OR NOT (blob IS NULL AND file_name IS NULL)",
            params![query.include_deleted],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn mark_synced(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.set_state(key, SyncState::Synced, Some(at))
    }

    pub fn mark_conflict(&self, key: &str) -> Result<()> {
        self.set_state(key, SyncState::Conflict, None)
    }

    /// Keys of records with unsynced local changes.
    pub fn pending_keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM items WHERE sync_state = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![SyncState::Pending.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn set_state(&self, key: &str, state: SyncState, at: Option<DateTime<Utc>>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE items SET sync_state = ?2, sync_at = COALESCE(?3, sync_at) WHERE key = ?1",
            params![key, state.as_str(), at],
        )?;
        if changed == 0 {
            return Err(VaultError::NotFound(format!("record {}", key)));
        }
        Ok(())
    }

    fn write_row(
        &self,
        meta: &ItemMeta,
        payload: Option<&[u8]>,
        old_file: Option<&str>,
        state: SyncState,
        sync_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // The file only takes its final name once the row points at it.
        let (inline, file_name) = match payload {
            Some(bytes) if bytes.len() >= self.inline_limit => {
                let name = blob_file_name(meta);
                std::fs::write(self.blob_dir.join(staged_name(&name)), bytes)?;
                (None, Some(name))
            }
            Some(bytes) => (Some(bytes), None),
            None => (None, None),
        };

        let upserted = self.conn.execute(
            "INSERT INTO items (key, description, created_at, updated_at, sync_at, sync_state, file_name, blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(key) DO UPDATE SET
                description = excluded.description,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                sync_at = excluded.sync_at,
                sync_state = excluded.sync_state,
                file_name = excluded.file_name,
                blob = excluded.blob",
            params![
                meta.key,
                meta.description,
                meta.created_at,
                meta.updated_at,
                sync_at,
                state.as_str(),
                file_name,
                inline,
            ],
        );

        if let Some(name) = &file_name {
            let staged = self.blob_dir.join(staged_name(name));
            if let Err(e) = upserted {
                self.remove_blob_file(&staged_name(name));
                return Err(e.into());
            }
            std::fs::rename(staged, self.blob_dir.join(name))?;
        } else {
            upserted?;
        }

        if let Some(old) = old_file {
            if file_name.as_deref() != Some(old) {
                self.remove_blob_file(old);
            }
        }
        Ok(())
    }

    fn remove_blob_file(&self, name: &str) {
        if let Err(e) = std::fs::remove_file(self.blob_dir.join(name)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %name, error = %e, "failed to remove blob file");
            }
        }
    }
}

fn staged_name(name: &str) -> String {
    format!("{}.tmp", name)
}

/// `{created_at µs}_{sha256(key) prefix}.bin`
fn blob_file_name(meta: &ItemMeta) -> String {
    let micros = meta.created_at.map(|t| t.timestamp_micros()).unwrap_or(0);
    let digest = Sha256::digest(meta.key.as_bytes());
    format!("{}_{}.bin", micros, &hex::encode(digest)[..16])
}

fn local_item_from_row(row: &Row<'_>) -> rusqlite::Result<LocalItem> {
    let state: String = row.get(5)?;
    Ok(LocalItem {
        meta: ItemMeta {
            key: row.get(0)?,
            description: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        },
        sync_at: row.get(4)?,
        sync_state: SyncState::parse(&state),
        file_name: row.get(6)?,
        deleted: row.get(7)?,
    })
}
