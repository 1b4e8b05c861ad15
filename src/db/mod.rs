// src/db/mod.rs

//! SQLite persistence layer
//!
//! All durable state lives here: upstream repository configuration,
//! discovered packages and versions, access tokens, and administrative
//! sessions. Connections are short-lived and opened per operation.

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

/// Open a connection with foreign keys enabled
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Open a connection and bring the schema up to date
pub fn open_and_migrate(db_path: &Path) -> Result<Connection> {
    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Get current timestamp as ISO 8601 string
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
