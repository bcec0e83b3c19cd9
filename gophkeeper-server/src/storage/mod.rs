//! SQLite storage backend for the server.
//!
//! The sync engine and the auth manager only see the [`Store`] traits; a
//! [`Storage`] hands them a store bound to one transaction.

pub mod models;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use gophkeeper_core::{DataItem, ItemMeta, ItemSummary, ListQuery};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use thiserror::Error;

use crate::deadline::CallContext;
pub use models::{StoredToken, StoredUser};

/// SQLite VM steps between cancellation checks.
const PROGRESS_STEPS: i32 = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("statement interrupted")]
    Interrupted,

    #[error("storage is closed")]
    Closed,

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => Self::Interrupted,
            _ => Self::Sqlite(e),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Records, scoped by owning user.
pub trait DataStorage {
    fn get_data_item(&self, user_id: i64, key: &str) -> StorageResult<Option<DataItem>>;
    /// Upsert by `(key, user_id)`. A stored `created_at` is never replaced.
    fn save_data_item(&self, user_id: i64, item: &DataItem) -> StorageResult<()>;
    fn list_data_items(&self, user_id: i64, query: &ListQuery) -> StorageResult<Vec<ItemSummary>>;
    fn count_data_items(&self, user_id: i64, query: &ListQuery) -> StorageResult<u64>;
}

pub trait UserStorage {
    /// Create a user with unset timestamps. Fails with `AlreadyExists` on a taken email.
    fn new_user(&self, email: &str, password_hash: &str) -> StorageResult<StoredUser>;
    fn get_user_by_email(&self, email: &str) -> StorageResult<Option<StoredUser>>;
    fn get_user_by_id(&self, id: i64) -> StorageResult<Option<StoredUser>>;
    fn save_user(&self, user: &StoredUser) -> StorageResult<()>;
    /// Remove the user with all tokens and records, all or nothing.
    fn delete_user(&self, id: i64) -> StorageResult<()>;
}

pub trait TokenStorage {
    fn new_client_token(&self, token: &StoredToken) -> StorageResult<()>;
    fn find_token(&self, token_hash: &str) -> StorageResult<Option<StoredToken>>;
    fn delete_token(&self, token_hash: &str) -> StorageResult<bool>;
    /// Delete tokens with `expires_at <= now`; returns how many.
    fn delete_expired_tokens(&self, now: i64) -> StorageResult<u64>;
}

/// Everything the engine and the auth manager need from storage.
pub trait Store: DataStorage + UserStorage + TokenStorage {}

impl<T: DataStorage + UserStorage + TokenStorage> Store for T {}

/// A store that can run a unit of work atomically.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Run `f` inside one immediate transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// Statements are interrupted once `ctx` is cancelled.
    fn atomically<R, E, F>(&self, ctx: &CallContext, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn Store) -> Result<R, E>,
        E: From<StorageError>;

    /// Release the underlying connection. Later calls fail with `Closed`.
    fn close(&self) -> StorageResult<()>;
}

/// Thread-safe SQLite storage.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStorage {
    /// Open a database by DSN: a file path or `:memory:`.
    pub fn open(dsn: &str) -> StorageResult<Self> {
        if dsn == ":memory:" {
            return Self::in_memory();
        }
        let conn = Connection::open(Path::new(dsn))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

impl Storage for SqliteStorage {
    fn atomically<R, E, F>(&self, ctx: &CallContext, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn Store) -> Result<R, E>,
        E: From<StorageError>,
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;

        if ctx.is_cancelled() {
            return Err(StorageError::Interrupted.into());
        }

        interruptible(conn, ctx, |conn| run_in_transaction(conn, f))
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StorageError::from(e))?;
            tracing::info!("storage closed");
        }
        Ok(())
    }
}

/// Run `f` with a progress handler that aborts statements once `ctx` is cancelled.
fn interruptible<T>(
    conn: &mut Connection,
    ctx: &CallContext,
    f: impl FnOnce(&mut Connection) -> T,
) -> T {
    let flag = ctx.flag();
    conn.progress_handler(
        PROGRESS_STEPS,
        Some(move || flag.load(std::sync::atomic::Ordering::SeqCst)),
    );
    let out = f(conn);
    conn.progress_handler(0, None::<fn() -> bool>);
    out
}

fn run_in_transaction<R, E, F>(conn: &mut Connection, f: F) -> Result<R, E>
where
    F: FnOnce(&dyn Store) -> Result<R, E>,
    E: From<StorageError>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StorageError::from)?;
    let value = f(&SqlStore(&tx))?;
    tx.commit().map_err(StorageError::from)?;
    Ok(value)
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            description TEXT,
            packed_key BLOB,
            created_at TEXT,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS client_tokens (
            token_id TEXT PRIMARY KEY,
            token_hash TEXT NOT NULL UNIQUE,
            user_id INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            remote_addr TEXT,
            user_agent TEXT,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS data_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            description TEXT,
            created_at TEXT,
            updated_at TEXT,
            blob BLOB,
            UNIQUE (key, user_id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_client_tokens_user
            ON client_tokens(user_id);
        CREATE INDEX IF NOT EXISTS idx_client_tokens_expires
            ON client_tokens(expires_at);
        CREATE INDEX IF NOT EXISTS idx_data_items_user
            ON data_items(user_id);",
    )?;
    Ok(())
}

/// Store operations over one connection or transaction.
struct SqlStore<'a>(&'a Connection);

const USER_COLUMNS: &str =
    "id, email, password_hash, description, packed_key, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredUser> {
    Ok(StoredUser {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        description: row.get(3)?,
        packed_key: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl DataStorage for SqlStore<'_> {
    fn get_data_item(&self, user_id: i64, key: &str) -> StorageResult<Option<DataItem>> {
        let item = self
            .0
            .query_row(
                "SELECT key, description, created_at, updated_at, blob
                 FROM data_items WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| {
                    Ok(DataItem {
                        meta: ItemMeta {
                            key: row.get(0)?,
                            description: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        },
                        blob: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    fn save_data_item(&self, user_id: i64, item: &DataItem) -> StorageResult<()> {
        self.0.execute(
            "INSERT INTO data_items (key, user_id, description, created_at, updated_at, blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key, user_id) DO UPDATE SET
                description = excluded.description,
                updated_at = excluded.updated_at,
                blob = excluded.blob,
                created_at = COALESCE(data_items.created_at, excluded.created_at)",
            params![
                item.meta.key,
                user_id,
                item.meta.description,
                item.meta.created_at,
                item.meta.updated_at,
                item.blob,
            ],
        )?;
        Ok(())
    }

    fn list_data_items(&self, user_id: i64, query: &ListQuery) -> StorageResult<Vec<ItemSummary>> {
        let sql = format!(
            "SELECT key, description, created_at, updated_at, blob IS NULL
             FROM data_items
             WHERE user_id = ?1 AND (?2 OR blob IS NOT NULL)
             ORDER BY {}, key
             LIMIT ?3 OFFSET ?4",
            query.order_by.column()
        );
        let mut stmt = self.0.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![user_id, query.include_deleted, query.limit, query.offset],
                |row| {
                    Ok(ItemSummary {
                        meta: ItemMeta {
                            key: row.get(0)?,
                            description: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        },
                        deleted: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn count_data_items(&self, user_id: i64, query: &ListQuery) -> StorageResult<u64> {
        let count: i64 = self.0.query_row(
            "SELECT COUNT(*) FROM data_items WHERE user_id = ?1 AND (?2 OR blob IS NOT NULL)",
            params![user_id, query.include_deleted],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl UserStorage for SqlStore<'_> {
    fn new_user(&self, email: &str, password_hash: &str) -> StorageResult<StoredUser> {
        let result = self.0.execute(
            "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
            params![email, password_hash],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StorageError::AlreadyExists(format!("user {}", email)));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(StoredUser {
            id: self.0.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            description: None,
            packed_key: None,
            created_at: None,
            updated_at: None,
        })
    }

    fn get_user_by_email(&self, email: &str) -> StorageResult<Option<StoredUser>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
        Ok(self.0.query_row(&sql, params![email], user_from_row).optional()?)
    }

    fn get_user_by_id(&self, id: i64) -> StorageResult<Option<StoredUser>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        Ok(self.0.query_row(&sql, params![id], user_from_row).optional()?)
    }

    fn save_user(&self, user: &StoredUser) -> StorageResult<()> {
        let changed = self.0.execute(
            "UPDATE users SET
                email = ?2, password_hash = ?3, description = ?4, packed_key = ?5,
                created_at = COALESCE(created_at, ?6), updated_at = ?7
             WHERE id = ?1",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.description,
                user.packed_key,
                user.created_at,
                user.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    fn delete_user(&self, id: i64) -> StorageResult<()> {
        self.0.execute_batch("SAVEPOINT delete_user")?;

        let result = (|| -> StorageResult<usize> {
            self.0
                .execute("DELETE FROM client_tokens WHERE user_id = ?1", params![id])?;
            self.0
                .execute("DELETE FROM data_items WHERE user_id = ?1", params![id])?;
            Ok(self.0.execute("DELETE FROM users WHERE id = ?1", params![id])?)
        })();

        match result {
            Ok(0) => {
                self.0
                    .execute_batch("ROLLBACK TO delete_user; RELEASE delete_user")?;
                Err(StorageError::NotFound(format!("user {}", id)))
            }
            Ok(_) => {
                self.0.execute_batch("RELEASE delete_user")?;
                Ok(())
            }
            Err(e) => {
                // Keep the first error; the rollback outcome is secondary.
                let _ = self
                    .0
                    .execute_batch("ROLLBACK TO delete_user; RELEASE delete_user");
                Err(e)
            }
        }
    }
}

impl TokenStorage for SqlStore<'_> {
    fn new_client_token(&self, token: &StoredToken) -> StorageResult<()> {
        self.0.execute(
            "INSERT INTO client_tokens
                (token_id, token_hash, user_id, expires_at, issued_at, remote_addr, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.token_id,
                token.token_hash,
                token.user_id,
                token.expires_at,
                token.issued_at,
                token.remote_addr,
                token.user_agent,
            ],
        )?;
        Ok(())
    }

    fn find_token(&self, token_hash: &str) -> StorageResult<Option<StoredToken>> {
        let token = self
            .0
            .query_row(
                "SELECT token_id, token_hash, user_id, expires_at, issued_at, remote_addr, user_agent
                 FROM client_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| {
                    Ok(StoredToken {
                        token_id: row.get(0)?,
                        token_hash: row.get(1)?,
                        user_id: row.get(2)?,
                        expires_at: row.get(3)?,
                        issued_at: row.get(4)?,
                        remote_addr: row.get(5)?,
                        user_agent: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    fn delete_token(&self, token_hash: &str) -> StorageResult<bool> {
        let changed = self.0.execute(
            "DELETE FROM client_tokens WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(changed > 0)
    }

    fn delete_expired_tokens(&self, now: i64) -> StorageResult<u64> {
        let changed = self
            .0
            .execute("DELETE FROM client_tokens WHERE expires_at <= ?1", params![now])?;
        Ok(changed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn run<R>(storage: &SqliteStorage, f: impl FnOnce(&dyn Store) -> StorageResult<R>) -> StorageResult<R> {
        storage.atomically(&CallContext::new(), f)
    }

    fn item(key: &str, c: Option<i64>, u: Option<i64>, blob: Option<&[u8]>) -> DataItem {
        DataItem {
            meta: ItemMeta {
                key: key.to_string(),
                description: None,
                created_at: c.map(t),
                updated_at: u.map(t),
            },
            blob: blob.map(|b| b.to_vec()),
        }
    }

    fn token(user_id: i64, hash: &str, expires_at: i64) -> StoredToken {
        StoredToken {
            token_id: uuid::Uuid::new_v4().to_string(),
            token_hash: hash.to_string(),
            user_id,
            expires_at,
            issued_at: 0,
            remote_addr: Some("127.0.0.1:5000".to_string()),
            user_agent: None,
        }
    }

    #[test]
    fn new_user_has_unset_timestamps() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "hash")).unwrap();
        assert!(user.created_at.is_none());

        let found = run(&storage, |s| s.get_user_by_email("a@x.com"))
            .unwrap()
            .unwrap();
        assert_eq!(found, user);
        assert!(matches!(
            run(&storage, |s| s.new_user("a@x.com", "other")),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn upsert_never_replaces_created_at() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "hash")).unwrap();

        run(&storage, |s| s.save_data_item(user.id, &item("k1", Some(0), None, Some(b"B1")))).unwrap();
        run(&storage, |s| {
            s.save_data_item(user.id, &item("k1", Some(50), Some(1), Some(b"B2")))
        })
        .unwrap();

        let stored = run(&storage, |s| s.get_data_item(user.id, "k1")).unwrap().unwrap();
        assert_eq!(stored.meta.created_at, Some(t(0)));
        assert_eq!(stored.meta.updated_at, Some(t(1)));
        assert_eq!(stored.blob, Some(b"B2".to_vec()));
    }

    #[test]
    fn upsert_fills_unset_created_at() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "hash")).unwrap();

        run(&storage, |s| s.save_data_item(user.id, &item("k1", None, None, Some(b"x")))).unwrap();
        run(&storage, |s| s.save_data_item(user.id, &item("k1", Some(3), None, Some(b"y")))).unwrap();

        let stored = run(&storage, |s| s.get_data_item(user.id, "k1")).unwrap().unwrap();
        assert_eq!(stored.meta.created_at, Some(t(3)));
    }

    #[test]
    fn records_are_scoped_by_user() {
        let storage = SqliteStorage::in_memory().unwrap();
        let a = run(&storage, |s| s.new_user("a@x.com", "h")).unwrap();
        let b = run(&storage, |s| s.new_user("b@x.com", "h")).unwrap();

        run(&storage, |s| s.save_data_item(a.id, &item("k1", Some(0), None, Some(b"A")))).unwrap();
        run(&storage, |s| s.save_data_item(b.id, &item("k1", Some(9), None, Some(b"B")))).unwrap();

        let ia = run(&storage, |s| s.get_data_item(a.id, "k1")).unwrap().unwrap();
        let ib = run(&storage, |s| s.get_data_item(b.id, "k1")).unwrap().unwrap();
        assert_eq!(ia.blob, Some(b"A".to_vec()));
        assert_eq!(ib.meta.created_at, Some(t(9)));
    }

    #[test]
    fn list_excludes_deleted_unless_asked() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "h")).unwrap();
        for (k, blob) in [("b", Some(&b"1"[..])), ("a", Some(&b"2"[..])), ("c", None)] {
            run(&storage, |s| s.save_data_item(user.id, &item(k, Some(0), None, blob))).unwrap();
        }

        let q = ListQuery::default();
        let items = run(&storage, |s| s.list_data_items(user.id, &q)).unwrap();
        let keys: Vec<_> = items.iter().map(|i| i.meta.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(run(&storage, |s| s.count_data_items(user.id, &q)).unwrap(), 2);

        let q = ListQuery::new(Some(2), Some(1)).including_deleted();
        let items = run(&storage, |s| s.list_data_items(user.id, &q)).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].meta.key, "c");
        assert!(items[1].deleted);
        assert_eq!(run(&storage, |s| s.count_data_items(user.id, &q)).unwrap(), 3);
    }

    #[test]
    fn delete_user_cascades() {
        let storage = SqliteStorage::in_memory().unwrap();
        let a = run(&storage, |s| s.new_user("a@x.com", "h")).unwrap();
        let b = run(&storage, |s| s.new_user("b@x.com", "h")).unwrap();
        run(&storage, |s| {
            s.new_client_token(&token(a.id, "ta", 100))?;
            s.new_client_token(&token(b.id, "tb", 100))?;
            s.save_data_item(a.id, &item("k1", Some(0), None, Some(b"x")))?;
            s.save_data_item(b.id, &item("k1", Some(0), None, Some(b"y")))
        })
        .unwrap();

        run(&storage, |s| s.delete_user(a.id)).unwrap();

        assert!(run(&storage, |s| s.get_user_by_id(a.id)).unwrap().is_none());
        assert!(run(&storage, |s| s.find_token("ta")).unwrap().is_none());
        assert!(run(&storage, |s| s.get_data_item(a.id, "k1")).unwrap().is_none());
        assert!(run(&storage, |s| s.find_token("tb")).unwrap().is_some());
        assert!(run(&storage, |s| s.get_data_item(b.id, "k1")).unwrap().is_some());

        assert!(matches!(
            run(&storage, |s| s.delete_user(a.id)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn failed_unit_of_work_rolls_back() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "h")).unwrap();

        let result: StorageResult<()> = run(&storage, |s| {
            s.delete_user(user.id)?;
            Err(StorageError::NotFound("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(run(&storage, |s| s.get_user_by_id(user.id)).unwrap().is_some());
    }

    #[test]
    fn expired_tokens_are_pruned() {
        let storage = SqliteStorage::in_memory().unwrap();
        let user = run(&storage, |s| s.new_user("a@x.com", "h")).unwrap();
        run(&storage, |s| {
            s.new_client_token(&token(user.id, "old", 10))?;
            s.new_client_token(&token(user.id, "new", 1000))
        })
        .unwrap();

        assert_eq!(run(&storage, |s| s.delete_expired_tokens(500)).unwrap(), 1);
        assert!(run(&storage, |s| s.find_token("old")).unwrap().is_none());
        assert!(run(&storage, |s| s.delete_token("new")).unwrap());
        assert!(!run(&storage, |s| s.delete_token("new")).unwrap());
    }

    #[test]
    fn cancelled_context_interrupts() {
        let storage = SqliteStorage::in_memory().unwrap();
        let ctx = CallContext::new();
        ctx.cancel();
        let result: StorageResult<()> = storage.atomically(&ctx, |_| Ok(()));
        assert!(matches!(result, Err(StorageError::Interrupted)));
    }

    #[test]
    fn long_statement_is_interrupted_by_cancel() {
        let mut conn = Connection::open_in_memory().unwrap();
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        let timer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            canceller.cancel();
        });

        let result = interruptible(&mut conn, &ctx, |conn| {
            conn.query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                 SELECT count(*) FROM c",
                [],
                |row| row.get::<_, i64>(0),
            )
        });
        timer.join().unwrap();

        let err = StorageError::from(result.unwrap_err());
        assert!(matches!(err, StorageError::Interrupted));

        // The handler is removed afterwards.
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn closed_storage_rejects_calls() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.close().unwrap();
        storage.close().unwrap();
        let result: StorageResult<()> = run(&storage, |_| Ok(()));
        assert!(matches!(result, Err(StorageError::Closed)));
    }
}
