// src/db/models/session.rs

//! Session model - administrative session tokens
//!
//! Sessions are created by an external login flow; the core only
//! consults them for dist-endpoint access. They carry their own expiry
//! and are exempt from per-token rate limiting.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Option<i64>,
    pub value: String,
    pub expires_at: String,
    pub created_at: Option<String>,
}

impl Session {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            value: row.get(1)?,
            expires_at: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    /// Insert a session (used by tests and external login glue)
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO sessions (value, expires_at) VALUES (?1, ?2)",
            params![&self.value, &self.expires_at],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a session by its presented value
    pub fn find_by_value(conn: &Connection, value: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, value, expires_at, created_at FROM sessions WHERE value = ?1",
        )?;
        Ok(stmt.query_row([value], Self::from_row).optional()?)
    }

    /// Whether the session has passed its expiry
    pub fn is_expired(&self) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(dt) => dt < chrono::Utc::now(),
            Err(_) => true,
        }
    }
}
