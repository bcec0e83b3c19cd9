//! Local cache schema.

use rusqlite::Connection;

use crate::Result;

/// Create the record table and its indexes if they do not exist yet.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            key TEXT PRIMARY KEY,
            description TEXT,
            created_at TEXT,
            updated_at TEXT,
            sync_at TEXT,
            sync_state TEXT NOT NULL DEFAULT 'pending',
            file_name TEXT,
            blob BLOB
        );
        CREATE INDEX IF NOT EXISTS idx_items_sync_state ON items(sync_state);
        CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at);",
    )?;
    Ok(())
}
