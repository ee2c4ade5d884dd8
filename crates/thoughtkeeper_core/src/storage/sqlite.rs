//! SQLite-backed key-value engine.
//!
//! # Responsibility
//! - Persist string entries in the migrated `kv_entries` table.
//! - Enforce an optional byte quota the way browser-local storage does.
//!
//! # Invariants
//! - `value_bytes` always mirrors `len(key) + len(value)` of the row.
//! - A rejected write does not touch the table.

use super::{entry_cost, KeyValueStore, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite key-value store borrowing an already migrated connection.
pub struct SqliteKeyValueStore<'conn> {
    conn: &'conn Connection,
    quota_bytes: Option<usize>,
}

impl<'conn> SqliteKeyValueStore<'conn> {
    /// Wraps a connection returned by `db::open_db` / `db::open_db_in_memory`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            quota_bytes: None,
        }
    }

    pub fn with_quota(conn: &'conn Connection, quota_bytes: usize) -> Self {
        Self {
            conn,
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes_excluding(&self, key: &str) -> StorageResult<usize> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(value_bytes), 0) FROM kv_entries WHERE key <> ?1;",
            [key],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(used).unwrap_or(usize::MAX))
    }
}

impl KeyValueStore for SqliteKeyValueStore<'_> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let cost = entry_cost(key, value);
        if let Some(limit_bytes) = self.quota_bytes {
            let required_bytes = self.used_bytes_excluding(key)? + cost;
            if required_bytes > limit_bytes {
                return Err(StorageError::QuotaExceeded {
                    required_bytes,
                    limit_bytes,
                });
            }
        }

        self.conn.execute(
            "INSERT INTO kv_entries (key, value, value_bytes, updated_at)
             VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_bytes = excluded.value_bytes,
                updated_at = excluded.updated_at;",
            params![key, value, i64::try_from(cost).unwrap_or(i64::MAX)],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_entries;")?;
        let mut rows = stmt.query([])?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next()? {
            keys.push(row.get(0)?);
        }
        Ok(keys)
    }
}
