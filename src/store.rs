use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The key-value table Cursor uses for chat/session persistence.
pub const DEFAULT_TABLE: &str = "cursorDiskKV";

/// Key prefix identifying conversation records inside the KV namespace.
pub const CONVERSATION_KEY_PATTERN: &str = "bubbleId:%";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database not found: {0}")]
    NotFound(PathBuf),

    #[error("Database is locked by another process. Close Cursor and try again.")]
    Locked,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e
            && matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            )
        {
            return StoreError::Locked;
        }
        StoreError::Sqlite(e)
    }
}

/// Read-only handle over a `state.vscdb` file. The underlying store is never
/// mutated; no busy timeout is set so write-lock contention surfaces as
/// [`StoreError::Locked`] instead of blocking.
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// All table names with their `CREATE TABLE` SQL, ordered by name.
    pub fn list_tables(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    /// Keys of a key-value table, ordered by key. `limit` caps the result
    /// count; `None` returns all keys.
    pub fn list_keys(&self, table: &str, limit: Option<usize>) -> Result<Vec<String>, StoreError> {
        let table = checked_ident(table)?;
        let sql = match limit {
            Some(n) => format!("SELECT key FROM \"{table}\" ORDER BY key LIMIT {n}"),
            None => format!("SELECT key FROM \"{table}\" ORDER BY key"),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Rows whose key matches an SQL `LIKE` pattern (`%` = any run of
    /// characters, `_` = any single character), ordered by key.
    pub fn search_keys(
        &self,
        table: &str,
        pattern: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let table = checked_ident(table)?;
        let sql = format!("SELECT key, value FROM \"{table}\" WHERE key LIKE ? ORDER BY key");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([pattern], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The value stored under `key`, or [`StoreError::KeyNotFound`].
    pub fn get_value(&self, table: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let table = checked_ident(table)?;
        let sql = format!("SELECT value FROM \"{table}\" WHERE key = ?");
        self.conn
            .query_row(&sql, [key], |row| row.get::<_, Vec<u8>>(0))
            .optional()?
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }
}

// Table names cannot be bound as SQL parameters; restrict them to plain
// identifiers before interpolation.
fn checked_ident(name: &str) -> Result<&str, StoreError> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(name)
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}
