//! [`SqliteStore`]: the `variables` table behind a connection pool.
//!
//! Values are stored as their tagged JSON form. Every write bumps the row's
//! `write_count`, so a reader can tell a rewrite of the same value apart from
//! no write at all.

use std::path::Path;

use chrono::{DateTime, Utc};
use revar_core::Value;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, instrument};

use super::connection::{self, ConnectionConfig, ConnectionPool};
use super::migrations;
use crate::PersistentStore;
use crate::errors::{Result, StoreError};

/// A stored variable row.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntry {
    /// Variable name.
    pub name: String,
    /// Last written value.
    pub value: Value,
    /// When the last write happened.
    pub updated_at: DateTime<Utc>,
    /// How many times the name has been written since it was created.
    pub write_count: u64,
}

/// `SQLite`-backed [`PersistentStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and bring its schema up to date.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// In-memory database, gone when the store is dropped.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, running pending migrations.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = migrations::run_migrations(&conn)?;
        if applied > 0 {
            debug!(applied, "store schema migrated");
        }
        drop(conn);
        Ok(Self { pool })
    }

    /// Full row for a name.
    pub fn entry(&self, name: &str) -> Result<Option<StoredEntry>> {
        let conn = self.pool.get()?;
        let entry = conn
            .query_row(
                "SELECT name, value, updated_at, write_count FROM variables WHERE name = ?1",
                params![name],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// All rows, ordered by name.
    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT name, value, updated_at, write_count FROM variables ORDER BY name",
        )?;
        let rows = stmt.query_map([], entry_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// How many times `name` has been written, or `None` if it isn't stored.
    pub fn write_count(&self, name: &str) -> Result<Option<u64>> {
        let conn = self.pool.get()?;
        let count: Option<i64> = conn
            .query_row(
                "SELECT write_count FROM variables WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|n| u64::try_from(n).unwrap_or_default()))
    }
}

impl PersistentStore for SqliteStore {
    fn get(&self, name: &str) -> Result<Option<Value>> {
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM variables WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    fn set(&self, name: &str, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO variables (name, value, updated_at, write_count)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(name) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at,
                 write_count = variables.write_count + 1",
            params![name, json, now],
        )?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM variables WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    fn names(&self) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT name FROM variables ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    let raw_value: String = row.get(1)?;
    let value = serde_json::from_str(&raw_value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let raw_time: String = row.get(2)?;
    let updated_at = DateTime::parse_from_rfc3339(&raw_time)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let write_count: i64 = row.get(3)?;
    Ok(StoredEntry {
        name: row.get(0)?,
        value,
        updated_at,
        write_count: u64::try_from(write_count).unwrap_or_default(),
    })
}
