//! SQLite backend for the resolution cache
//!
//! One row per key, with the kind, the collection namespace (indexed, so
//! invalidation never touches other collections) and the write timestamp in
//! milliseconds since the epoch.

use crate::backend::{CacheEntry, StorageBackend};
use crate::error::{CacheError, Result};
use crate::kind::CacheKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

const DEFAULT_TABLE: &str = "resolutions";

/// Persistent backend stored in a single SQLite file
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    table_name: String,
}

impl SqliteStorage {
    /// Opens (and creates if needed) the database at `path`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use mangacache::SqliteStorage;
    /// use std::path::Path;
    ///
    /// let storage = SqliteStorage::open(Path::new("cache/resolutions.sqlite")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?, DEFAULT_TABLE)
    }

    /// Opens the default database file inside `dir`
    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(&dir.join("resolutions.sqlite"))
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, DEFAULT_TABLE)
    }

    fn init(conn: Connection, table_name: &str) -> Result<Self> {
        let create_table_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                collection TEXT,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            )",
            table_name
        );
        conn.execute(&create_table_sql, [])?;

        let create_collection_index_sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_collection ON {} (collection)",
            table_name, table_name
        );
        conn.execute(&create_collection_index_sql, [])?;

        let create_kind_index_sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_kind ON {} (kind, stored_at)",
            table_name, table_name
        );
        conn.execute(&create_kind_index_sql, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
        })
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<(String, String, Option<String>, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn decode(
        (key, kind, collection, value, stored_at): (String, String, Option<String>, String, i64),
    ) -> Result<CacheEntry> {
        let kind = kind.parse::<CacheKind>().map_err(|reason| CacheError::InvalidEntry {
            key: key.clone(),
            reason,
        })?;
        let stored_at =
            DateTime::<Utc>::from_timestamp_millis(stored_at).ok_or_else(|| {
                CacheError::InvalidEntry {
                    key: key.clone(),
                    reason: format!("timestamp {} out of range", stored_at),
                }
            })?;
        Ok(CacheEntry {
            key,
            value,
            stored_at,
            kind,
            collection,
        })
    }
}

impl StorageBackend for SqliteStorage {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT key, kind, collection, value, stored_at FROM {} WHERE key = ?1",
            self.table_name
        );
        let row = conn
            .query_row(&sql, [key], Self::read_row)
            .optional()?;
        row.map(Self::decode).transpose()
    }

    fn store(&self, entry: CacheEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "INSERT INTO {} (key, kind, collection, value, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                 kind = excluded.kind,
                 collection = excluded.collection,
                 value = excluded.value,
                 stored_at = excluded.stored_at",
            self.table_name
        );
        conn.execute(
            &sql,
            params![
                entry.key,
                entry.kind.as_str(),
                entry.collection,
                entry.value,
                entry.stored_at.timestamp_millis()
            ],
        )?;
        debug!(key = %entry.key, "Stored cache row");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.table_name);
        Ok(conn.execute(&sql, [key])? > 0)
    }

    fn remove_collection(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("DELETE FROM {} WHERE collection = ?1", self.table_name);
        Ok(conn.execute(&sql, [collection])?)
    }

    fn remove_stored_before(&self, kind: CacheKind, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "DELETE FROM {} WHERE kind = ?1 AND stored_at < ?2",
            self.table_name
        );
        Ok(conn.execute(&sql, params![kind.as_str(), cutoff.timestamp_millis()])?)
    }

    fn count_by_kind(&self) -> Result<HashMap<CacheKind, usize>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT kind, COUNT(*) FROM {} GROUP BY kind", self.table_name);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = HashMap::new();
        for (kind, count) in rows {
            if let Ok(kind) = kind.parse::<CacheKind>() {
                counts.insert(kind, count.max(0) as usize);
            }
        }
        Ok(counts)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("DELETE FROM {}", self.table_name);
        conn.execute(&sql, [])?;
        Ok(())
    }
}
