//! SQLite store of installed mods and catalog history

mod links;
mod schema;

pub use links::*;
pub use schema::*;

use crate::mods::RecentChangeInfo;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database wrapper with thread-safe access
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::with_connection(conn)
    }

    /// Throwaway database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("Database lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Installed mods, catalog or manual
            CREATE TABLE IF NOT EXISTS installed_mods (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                pinned INTEGER NOT NULL DEFAULT 0,
                from_catalog INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );

            -- The modding API; at most one row
            CREATE TABLE IF NOT EXISTS api_install (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            -- Catalog snapshots, used for what's-new
            CREATE TABLE IF NOT EXISTS catalog_history (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                first_seen TEXT,
                last_updated TEXT
            );
            "#,
        )
        .context("Failed to initialize schema")?;

        Ok(())
    }

    // ========== Installed mods ==========

    /// Insert or replace the record for `record.name`
    pub fn upsert_installed(&self, record: &InstalledModRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO installed_mods (name, version, enabled, pinned, from_catalog, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(name) DO UPDATE SET
                version = excluded.version,
                enabled = excluded.enabled,
                pinned = excluded.pinned,
                from_catalog = excluded.from_catalog,
                updated_at = excluded.updated_at
            "#,
            params![
                record.name,
                record.version,
                record.enabled as i32,
                record.pinned as i32,
                record.from_catalog as i32,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_installed(&self, name: &str) -> Result<Option<InstalledModRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT name, version, enabled, pinned, from_catalog, updated_at
                 FROM installed_mods WHERE name = ?1",
                params![name],
                InstalledModRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_installed(&self) -> Result<Vec<InstalledModRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, version, enabled, pinned, from_catalog, updated_at
             FROM installed_mods ORDER BY name ASC",
        )?;

        let records = stmt
            .query_map([], InstalledModRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn remove_installed(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM installed_mods WHERE name = ?1", params![name])?;
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE installed_mods SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
            params![enabled as i32, Utc::now().to_rfc3339(), name],
        )?;
        if changed == 0 {
            tracing::warn!("No install record for {} while setting enabled", name);
        }
        Ok(())
    }

    pub fn set_pinned(&self, name: &str, pinned: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE installed_mods SET pinned = ?1, updated_at = ?2 WHERE name = ?3",
            params![pinned as i32, Utc::now().to_rfc3339(), name],
        )?;
        if changed == 0 {
            tracing::warn!("No install record for {} while setting pinned", name);
        }
        Ok(())
    }

    // ========== API ==========

    pub fn get_api(&self) -> Result<Option<ApiRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT version, enabled FROM api_install WHERE id = 1",
                [],
                ApiRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn set_api(&self, record: ApiRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO api_install (id, version, enabled) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET version = excluded.version, enabled = excluded.enabled
            "#,
            params![record.version, record.enabled as i32],
        )?;
        Ok(())
    }

    // ========== Catalog history ==========

    /// Record the current catalog and return what changed recently per mod.
    ///
    /// The very first snapshot has nothing to compare against, so entries seen
    /// then have no creation time.
    pub fn observe_catalog(
        &self,
        entries: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, RecentChangeInfo>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let known: HashMap<String, CatalogHistoryRecord> = {
            let mut stmt =
                tx.prepare("SELECT name, version, first_seen, last_updated FROM catalog_history")?;
            let rows = stmt
                .query_map([], CatalogHistoryRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(|r| (r.name.clone(), r)).collect()
        };
        let first_snapshot = known.is_empty();
        let stamp = now.to_rfc3339();

        let mut result = HashMap::new();
        for (name, version) in entries {
            let record = match known.get(name) {
                None => CatalogHistoryRecord {
                    name: name.clone(),
                    version: version.clone(),
                    first_seen: (!first_snapshot).then(|| stamp.clone()),
                    last_updated: None,
                },
                Some(previous) if previous.version != *version => CatalogHistoryRecord {
                    version: version.clone(),
                    last_updated: Some(stamp.clone()),
                    ..previous.clone()
                },
                Some(previous) => previous.clone(),
            };

            tx.execute(
                r#"
                INSERT INTO catalog_history (name, version, first_seen, last_updated)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(name) DO UPDATE SET
                    version = excluded.version,
                    first_seen = excluded.first_seen,
                    last_updated = excluded.last_updated
                "#,
                params![record.name, record.version, record.first_seen, record.last_updated],
            )?;

            result.insert(
                name.clone(),
                RecentChangeInfo {
                    last_created: parse_timestamp(record.first_seen.as_deref()),
                    last_updated: parse_timestamp(record.last_updated.as_deref()),
                },
            );
        }

        tx.commit()?;
        Ok(result)
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("Ignoring malformed timestamp {}: {}", value, e);
            None
        }
    }
}
