// src/db/models/package.rs

//! Package and Version models - discovered package metadata
//!
//! Packages are unique by (vendor, name) and own an ordered set of
//! versions. The sync engine writes through `upsert`; a failed sync
//! never deletes previously known versions.

use crate::db::current_timestamp;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Package identified by vendor/name
#[derive(Debug, Clone)]
pub struct Package {
    pub id: Option<i64>,
    pub repository_id: Option<i64>,
    pub vendor: String,
    pub name: String,
    pub description: Option<String>,
    pub last_modified_at: Option<String>,
    pub created_at: Option<String>,
}

/// One released (or branch) version of a package
#[derive(Debug, Clone)]
pub struct Version {
    pub id: Option<i64>,
    pub package_id: i64,
    pub version: String,
    pub dist_url: String,
    pub source_reference: Option<String>,
    pub require_json: Option<String>,
    pub readme_url: Option<String>,
    pub changelog_url: Option<String>,
    pub created_at: Option<String>,
}

impl Package {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repository_id: row.get(1)?,
            vendor: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            last_modified_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    const COLUMNS: &'static str =
        "id, repository_id, vendor, name, description, last_modified_at, created_at";

    /// Full "vendor/name" identifier
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }

    /// Find a package by (vendor, name)
    pub fn find(conn: &Connection, vendor: &str, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE vendor = ?1 AND name = ?2",
            Self::COLUMNS
        ))?;
        Ok(stmt.query_row([vendor, name], Self::from_row).optional()?)
    }

    /// List all packages, ordered by full name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY vendor, name",
            Self::COLUMNS
        ))?;
        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Insert a package or return the existing row for (vendor, name)
    ///
    /// Bumps `last_modified_at` either way, so cached provider
    /// documents can detect staleness from the freshness marker.
    pub fn upsert(
        conn: &Connection,
        repository_id: Option<i64>,
        vendor: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Self> {
        let now = current_timestamp();
        match Self::find(conn, vendor, name)? {
            Some(mut existing) => {
                conn.execute(
                    "UPDATE packages SET repository_id = COALESCE(?1, repository_id),
                        description = COALESCE(?2, description), last_modified_at = ?3
                     WHERE id = ?4",
                    params![repository_id, description, &now, existing.id],
                )?;
                existing.last_modified_at = Some(now);
                Ok(existing)
            }
            None => {
                conn.execute(
                    "INSERT INTO packages (repository_id, vendor, name, description, last_modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![repository_id, vendor, name, description, &now],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Self {
                    id: Some(id),
                    repository_id,
                    vendor: vendor.to_string(),
                    name: name.to_string(),
                    description: description.map(|s| s.to_string()),
                    last_modified_at: Some(now),
                    created_at: None,
                })
            }
        }
    }
}

impl Version {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            version: row.get(2)?,
            dist_url: row.get(3)?,
            source_reference: row.get(4)?,
            require_json: row.get(5)?,
            readme_url: row.get(6)?,
            changelog_url: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    const COLUMNS: &'static str = "id, package_id, version, dist_url, source_reference, \
         require_json, readme_url, changelog_url, created_at";

    /// List all versions of a package in insertion order
    pub fn list_for_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM versions WHERE package_id = ?1 ORDER BY id",
            Self::COLUMNS
        ))?;
        let versions = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// Find a specific version of a package
    pub fn find(conn: &Connection, package_id: i64, version: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM versions WHERE package_id = ?1 AND version = ?2",
            Self::COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![package_id, version], Self::from_row)
            .optional()?)
    }

    /// Find a version by its source reference (lockfile pinning)
    pub fn find_by_reference(
        conn: &Connection,
        package_id: i64,
        reference: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM versions WHERE package_id = ?1 AND source_reference = ?2",
            Self::COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![package_id, reference], Self::from_row)
            .optional()?)
    }

    /// Insert or update one (package, version) pair
    ///
    /// Versions absent from a sync run are left untouched; only the
    /// pair being written is affected.
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO versions (package_id, version, dist_url, source_reference,
                require_json, readme_url, changelog_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (package_id, version) DO UPDATE SET
                dist_url = excluded.dist_url,
                source_reference = excluded.source_reference,
                require_json = excluded.require_json,
                readme_url = excluded.readme_url,
                changelog_url = excluded.changelog_url",
            params![
                self.package_id,
                &self.version,
                &self.dist_url,
                &self.source_reference,
                &self.require_json,
                &self.readme_url,
                &self.changelog_url,
            ],
        )?;
        Ok(())
    }
}
