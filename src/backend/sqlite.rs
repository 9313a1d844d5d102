//! SQLite Backend Module
//!
//! Keeps entries in the `cache_storage` table. Expired rows are filtered out
//! by every read and purged by `garbage_collect`.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use super::entry::expiry_timestamp;
use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::key::Key;

const NAME: &str = "sqlite";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_storage (
    namespace TEXT,
    key TEXT,
    value TEXT,
    numeric INTEGER,
    date DATETIME,
    expire DATETIME,
    PRIMARY KEY (namespace, key)
);";

const COLUMNS: [&str; 6] = ["namespace", "key", "value", "numeric", "date", "expire"];

/// Row predicate matching entries that have not expired
const LIVE: &str = "(expire IS NULL OR expire >= DATETIME('now'))";

// == SQLite Backend ==
pub struct SqliteBackend {
    conn: Connection,
}

fn driver_error(err: rusqlite::Error) -> CacheError {
    CacheError::backend(NAME, err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// SQLite `DATETIME` text for an absolute expiry, `None` for no expiry.
fn expire_column(ttl: u64) -> Option<String> {
    let timestamp = expiry_timestamp(ttl);
    if timestamp == 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
}

impl SqliteBackend {
    // == Connect ==
    /// Opens the database and ensures the schema exists.
    ///
    /// # Arguments
    /// * `path` - Database file, or `:memory:` for an in-memory database
    /// * `flags` - Open flags, rusqlite's defaults when `None`
    pub fn open(path: impl AsRef<Path>, flags: Option<OpenFlags>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CacheError::InvalidArgument("invalid path".into()));
        }
        let flags = flags.unwrap_or_default();

        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(path, flags)
        }
        .map_err(|e| CacheError::connection(NAME, e))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| CacheError::connection(NAME, e))?;

        Ok(Self { conn })
    }

    /// Checks that `cache_storage` carries every expected column.
    pub fn probe(&self) -> bool {
        let Ok(mut stmt) = self.conn.prepare("PRAGMA table_info(cache_storage)") else {
            return false;
        };
        let Ok(names) = stmt.query_map([], |row| row.get::<_, String>(1)) else {
            return false;
        };
        let names: Vec<String> = names.filter_map(std::result::Result::ok).collect();
        COLUMNS
            .iter()
            .all(|column| names.iter().any(|name| name == column))
    }

    pub fn close(self) {
        if let Err((_, err)) = self.conn.close() {
            debug!(error = %err, "sqlite connection closed with error");
        }
    }
}

impl CacheBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: u64) -> Result<()> {
        let entry = key.entry()?;
        let numeric = i64::from(value.is_number());
        let encoded = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        let expire = expire_column(ttl);

        if !overwrite {
            // An expired row must not block a fresh insert
            self.conn
                .execute(
                    &format!(
                        "DELETE FROM cache_storage WHERE namespace = ?1 AND key = ?2 AND NOT {}",
                        LIVE
                    ),
                    params![key.namespace, entry],
                )
                .map_err(driver_error)?;
        }

        let verb = if overwrite { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO cache_storage (namespace, key, value, numeric, date, expire) \
             VALUES (?1, ?2, ?3, ?4, DATETIME('now'), ?5)",
            verb
        );
        match self
            .conn
            .execute(&sql, params![key.namespace, entry, encoded, numeric, expire])
        {
            Ok(_) => Ok(()),
            Err(e) if !overwrite && is_constraint_violation(&e) => Err(CacheError::KeyExists),
            Err(e) => Err(driver_error(e)),
        }
    }

    fn fetch(&mut self, key: &Key) -> Result<Value> {
        let entry = key.entry()?;
        let sql = format!(
            "SELECT value FROM cache_storage WHERE namespace = ?1 AND key = ?2 AND {} LIMIT 1",
            LIVE
        );
        let data: Option<String> = self
            .conn
            .query_row(&sql, params![key.namespace, entry], |row| row.get(0))
            .optional()
            .map_err(driver_error)?;

        let data = data.ok_or(CacheError::NotFound)?;
        serde_json::from_str(&data).map_err(CacheError::Deserialization)
    }

    fn exists(&mut self, key: &Key) -> Result<bool> {
        let entry = key.entry()?;
        let sql = format!(
            "SELECT 1 FROM cache_storage WHERE namespace = ?1 AND key = ?2 AND {} LIMIT 1",
            LIVE
        );
        let found: Option<i64> = self
            .conn
            .query_row(&sql, params![key.namespace, entry], |row| row.get(0))
            .optional()
            .map_err(driver_error)?;
        Ok(found.is_some())
    }

    fn increment(&mut self, key: &Key, delta: f64) -> Result<()> {
        let entry = key.entry()?;
        // Whole deltas are bound as integers so integer values stay integral
        let delta = if delta.fract() == 0.0 && delta.abs() < i64::MAX as f64 {
            SqlValue::Integer(delta as i64)
        } else {
            SqlValue::Real(delta)
        };
        self.conn
            .execute(
                "UPDATE cache_storage SET value = value + ?1 \
                 WHERE namespace = ?2 AND key = ?3 AND numeric = 1",
                params![delta, key.namespace, entry],
            )
            .map_err(driver_error)?;
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Result<()> {
        let entry = key.entry()?;
        self.conn
            .execute(
                "DELETE FROM cache_storage WHERE namespace = ?1 AND key = ?2",
                params![key.namespace, entry],
            )
            .map_err(driver_error)?;
        Ok(())
    }

    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()> {
        let result = if all {
            self.conn.execute("DELETE FROM cache_storage", [])
        } else {
            self.conn.execute(
                "DELETE FROM cache_storage WHERE namespace = ?1",
                params![key.namespace],
            )
        };
        result.map_err(driver_error)?;
        Ok(())
    }

    // == Garbage Collect ==
    fn garbage_collect(&mut self) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM cache_storage WHERE expire IS NOT NULL AND expire < DATETIME('now')",
                [],
            )
            .map_err(driver_error)
    }
}
