//! Database record types

use rusqlite::Row;

/// One installed mod as recorded on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModRecord {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub pinned: bool,
    /// Installed from the catalog rather than from a local file
    pub from_catalog: bool,
    pub updated_at: String,
}

impl InstalledModRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            enabled: row.get::<_, i32>(2)? != 0,
            pinned: row.get::<_, i32>(3)? != 0,
            from_catalog: row.get::<_, i32>(4)? != 0,
            updated_at: row.get(5)?,
        })
    }
}

/// The installed modding API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRecord {
    pub version: u32,
    pub enabled: bool,
}

impl ApiRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            version: row.get(0)?,
            enabled: row.get::<_, i32>(1)? != 0,
        })
    }
}

/// When a catalog entry was first seen and last changed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHistoryRecord {
    pub name: String,
    pub version: String,
    pub first_seen: Option<String>,
    pub last_updated: Option<String>,
}

impl CatalogHistoryRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            first_seen: row.get(2)?,
            last_updated: row.get(3)?,
        })
    }
}
