// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! Defines the SQLite schema for all core tables and provides a
//! migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables:
/// - repositories: upstream source configuration and sync status
/// - packages / versions: discovered package metadata
/// - tokens: package-tool credentials with rate-limit ceilings
/// - sessions: administrative session tokens for dist access
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Upstream sources the sync engine pulls package definitions from
        CREATE TABLE repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            source_type TEXT NOT NULL CHECK (source_type IN ('gitlab', 'composer', 'artifact')),
            credential_type TEXT,
            credential_token TEXT,
            credential_user TEXT,
            credential_password TEXT,
            account TEXT,
            project TEXT,
            path_filter TEXT,
            package_filter TEXT,
            branch TEXT,
            sync_interval INTEGER NOT NULL DEFAULT 3600,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'active', 'error', 'syncing')),
            error_message TEXT,
            last_synced_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Packages, unique by (vendor, name)
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER REFERENCES repositories(id),
            vendor TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            last_modified_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (vendor, name)
        );

        -- Version entries owned by a package; version strings unique per package
        CREATE TABLE versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            version TEXT NOT NULL,
            dist_url TEXT NOT NULL,
            source_reference TEXT,
            require_json TEXT,
            readme_url TEXT,
            changelog_url TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (package_id, version)
        );

        CREATE INDEX idx_versions_package ON versions(package_id);

        -- Package-tool credentials
        CREATE TABLE tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value TEXT NOT NULL UNIQUE,
            description TEXT,
            permission TEXT NOT NULL DEFAULT 'readonly'
                CHECK (permission IN ('readonly', 'write')),
            rate_limit INTEGER,
            expires_at TEXT,
            last_used_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Administrative sessions, created by the external login flow
        CREATE TABLE sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )?;

    Ok(())
}
