//! `SQLite` implementation of [`UserStore`] and [`HistoryStore`].

use super::connection::{acquire_lock, configure_connection, db_error, open_file, timed};
use crate::models::{SearchHistoryRecord, UserId, UserRecord, UserStatus};
use crate::storage::{HistoryStore, UserStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

/// `SQLite`-backed record store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
/// Each trait method holds the lock for exactly one statement (or one
/// `BEGIN IMMEDIATE ... COMMIT` block), never across an await point.
///
/// # Schema
///
/// - `users(user_id UNIQUE, username, status, requested_at)`
/// - `search_history(user_id, username, query, timestamp)`, indexed on
///   `timestamp DESC` for the newest-first history view
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = open_file(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_error("open_sqlite_in_memory"))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                username TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                requested_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS search_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT,
                query TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_status ON users(status);
            CREATE INDEX IF NOT EXISTS idx_search_history_timestamp
                ON search_history(timestamp DESC);",
        )
        .map_err(db_error("create_schema"))
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
        let status: String = row.get(2)?;
        let display_name: Option<String> = row.get(1)?;
        Ok(UserRecord {
            id: UserId::new(row.get(0)?),
            display_name: display_name.unwrap_or_else(|| "N/A".to_string()),
            status: UserStatus::parse(&status),
            requested_at: row.get(3)?,
        })
    }
}

impl UserStore for SqliteStore {
    #[instrument(skip(self), fields(operation = "get_user", backend = "sqlite", user.id = %id))]
    fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        timed("get_user", || {
            let conn = acquire_lock(&self.conn);
            conn.query_row(
                "SELECT user_id, username, status, requested_at FROM users WHERE user_id = ?1",
                params![id.get()],
                Self::user_from_row,
            )
            .optional()
            .map_err(db_error("get_user"))
        })
    }

    #[instrument(skip(self, record), fields(operation = "insert_user", backend = "sqlite", user.id = %record.id))]
    fn insert(&self, record: &UserRecord) -> Result<bool> {
        timed("insert_user", || {
            let conn = acquire_lock(&self.conn);
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO users (user_id, username, status, requested_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        record.id.get(),
                        record.display_name,
                        record.status.as_str(),
                        record.requested_at
                    ],
                )
                .map_err(db_error("insert_user"))?;
            Ok(inserted > 0)
        })
    }

    #[instrument(skip(self), fields(operation = "set_status", backend = "sqlite", user.id = %id))]
    fn set_status(&self, id: UserId, status: UserStatus) -> Result<bool> {
        timed("set_status", || {
            let conn = acquire_lock(&self.conn);
            let updated = conn
                .execute(
                    "UPDATE users SET status = ?1 WHERE user_id = ?2",
                    params![status.as_str(), id.get()],
                )
                .map_err(db_error("set_status"))?;
            Ok(updated > 0)
        })
    }

    #[instrument(skip(self), fields(operation = "upsert_status", backend = "sqlite", user.id = %id))]
    fn upsert_status(&self, id: UserId, display_name: &str, status: UserStatus) -> Result<()> {
        timed("upsert_status", || {
            let conn = acquire_lock(&self.conn);
            conn.execute("BEGIN IMMEDIATE", [])
                .map_err(db_error("begin_transaction"))?;

            let result = (|| {
                let updated = conn
                    .execute(
                        "UPDATE users SET status = ?1 WHERE user_id = ?2",
                        params![status.as_str(), id.get()],
                    )
                    .map_err(db_error("upsert_update"))?;
                if updated == 0 {
                    conn.execute(
                        "INSERT INTO users (user_id, username, status, requested_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            id.get(),
                            display_name,
                            status.as_str(),
                            crate::current_timestamp()
                        ],
                    )
                    .map_err(db_error("upsert_insert"))?;
                }
                Ok(())
            })();

            if result.is_ok() {
                conn.execute("COMMIT", [])
                    .map_err(db_error("commit_transaction"))?;
            } else {
                let _ = conn.execute("ROLLBACK", []);
            }
            result
        })
    }

    #[instrument(skip(self), fields(operation = "list_users", backend = "sqlite"))]
    fn list(&self) -> Result<Vec<UserRecord>> {
        timed("list_users", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, status, requested_at FROM users
                     ORDER BY requested_at, id",
                )
                .map_err(db_error("prepare_list_users"))?;
            let rows = stmt
                .query_map([], Self::user_from_row)
                .map_err(db_error("list_users"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("list_users_row"))
        })
    }

    #[instrument(skip(self), fields(operation = "ids_with_status", backend = "sqlite"))]
    fn ids_with_status(&self, status: UserStatus) -> Result<Vec<UserId>> {
        timed("ids_with_status", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare("SELECT user_id FROM users WHERE status = ?1 ORDER BY id")
                .map_err(db_error("prepare_ids_with_status"))?;
            let rows = stmt
                .query_map(params![status.as_str()], |row| row.get::<_, i64>(0))
                .map_err(db_error("ids_with_status"))?;
            rows.map(|r| r.map(UserId::new))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("ids_with_status_row"))
        })
    }
}

impl HistoryStore for SqliteStore {
    #[instrument(skip(self, record), fields(operation = "append_history", backend = "sqlite", user.id = %record.user_id))]
    fn append(&self, record: &SearchHistoryRecord) -> Result<()> {
        timed("append_history", || {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO search_history (user_id, username, query, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.user_id.get(),
                    record.display_name,
                    record.query,
                    record.timestamp
                ],
            )
            .map_err(db_error("append_history"))?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(operation = "recent_history", backend = "sqlite"))]
    fn recent(&self, limit: usize) -> Result<Vec<SearchHistoryRecord>> {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::InvalidInput(format!("history limit too large: {limit}")))?;
        timed("recent_history", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, query, timestamp FROM search_history
                     ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )
                .map_err(db_error("prepare_recent_history"))?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    let display_name: Option<String> = row.get(1)?;
                    Ok(SearchHistoryRecord {
                        user_id: UserId::new(row.get(0)?),
                        display_name: display_name.unwrap_or_else(|| "N/A".to_string()),
                        query: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                })
                .map_err(db_error("recent_history"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("recent_history_row"))
        })
    }

    #[instrument(skip(self), fields(operation = "count_history", backend = "sqlite"))]
    fn count_since(&self, since: i64) -> Result<u64> {
        timed("count_history", || {
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM search_history WHERE timestamp >= ?1",
                    params![since],
                    |row| row.get(0),
                )
                .map_err(db_error("count_history"))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}
