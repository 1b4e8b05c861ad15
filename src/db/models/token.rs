// src/db/models/token.rs

//! Token model - package-tool credentials

use crate::db::current_timestamp;
use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt;
use std::str::FromStr;

/// Upper bound on configurable rate-limit ceilings (requests/hour)
pub const MAX_RATE_LIMIT: i64 = 25_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Readonly,
    Write,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Readonly => "readonly",
            Permission::Write => "write",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "readonly" => Ok(Permission::Readonly),
            "write" => Ok(Permission::Write),
            other => Err(Error::Validation(format!("unknown permission '{other}'"))),
        }
    }
}

/// Package-tool credential with an optional hourly ceiling
#[derive(Debug, Clone)]
pub struct Token {
    pub id: Option<i64>,
    pub value: String,
    pub description: Option<String>,
    pub permission: Permission,
    /// Requests per hour; None or 0 = unlimited
    pub rate_limit: Option<i64>,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub created_at: Option<String>,
}

impl Token {
    pub fn new(value: String, description: Option<String>) -> Self {
        Self {
            id: None,
            value,
            description,
            permission: Permission::Readonly,
            rate_limit: None,
            expires_at: None,
            last_used_at: None,
            created_at: None,
        }
    }

    const COLUMNS: &'static str =
        "id, value, description, permission, rate_limit, expires_at, last_used_at, created_at";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let permission: String = row.get(3)?;
        Ok(Self {
            id: Some(row.get(0)?),
            value: row.get(1)?,
            description: row.get(2)?,
            permission: permission.parse().map_err(|_| {
                rusqlite::Error::InvalidColumnType(3, "permission".into(), rusqlite::types::Type::Text)
            })?,
            rate_limit: row.get(4)?,
            expires_at: row.get(5)?,
            last_used_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    /// Insert this token into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        if let Some(limit) = self.rate_limit {
            if !(0..=MAX_RATE_LIMIT).contains(&limit) {
                return Err(Error::Validation(format!(
                    "rate limit must be between 0 and {MAX_RATE_LIMIT}"
                )));
            }
        }

        conn.execute(
            "INSERT INTO tokens (value, description, permission, rate_limit, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.value,
                &self.description,
                self.permission.to_string(),
                self.rate_limit,
                &self.expires_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a token by its presented value
    pub fn find_by_value(conn: &Connection, value: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tokens WHERE value = ?1",
            Self::COLUMNS
        ))?;
        Ok(stmt.query_row([value], Self::from_row).optional()?)
    }

    /// Whether the token has passed its expiry
    pub fn is_expired(&self) -> bool {
        match &self.expires_at {
            None => false,
            Some(expiry) => match chrono::DateTime::parse_from_rfc3339(expiry) {
                Ok(dt) => dt < chrono::Utc::now(),
                // An unparseable expiry counts as expired
                Err(_) => true,
            },
        }
    }

    /// Effective hourly ceiling; None = unlimited
    pub fn ceiling(&self) -> Option<i64> {
        match self.rate_limit {
            None | Some(0) => None,
            Some(limit) => Some(limit),
        }
    }

    /// Record that the token was just used
    pub fn touch(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![current_timestamp(), self.id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_find() {
        let conn = create_test_db();

        let mut token = Token::new("secret-token".to_string(), Some("ci".to_string()));
        token.rate_limit = Some(100);
        token.insert(&conn).unwrap();

        let found = Token::find_by_value(&conn, "secret-token").unwrap().unwrap();
        assert_eq!(found.permission, Permission::Readonly);
        assert_eq!(found.ceiling(), Some(100));
        assert!(!found.is_expired());
    }

    #[test]
    fn test_zero_ceiling_is_unlimited() {
        let mut token = Token::new("t".to_string(), None);
        assert_eq!(token.ceiling(), None);
        token.rate_limit = Some(0);
        assert_eq!(token.ceiling(), None);
    }

    #[test]
    fn test_rate_limit_bounds() {
        let conn = create_test_db();

        let mut token = Token::new("t".to_string(), None);
        token.rate_limit = Some(MAX_RATE_LIMIT + 1);
        assert!(token.insert(&conn).is_err());
    }

    #[test]
    fn test_expiry() {
        let mut token = Token::new("t".to_string(), None);
        token.expires_at = Some("2000-01-01T00:00:00+00:00".to_string());
        assert!(token.is_expired());

        token.expires_at = Some("2999-01-01T00:00:00+00:00".to_string());
        assert!(!token.is_expired());
    }

    #[test]
    fn test_touch_updates_last_used() {
        let conn = create_test_db();

        let mut token = Token::new("t".to_string(), None);
        token.insert(&conn).unwrap();
        token.touch(&conn).unwrap();

        let found = Token::find_by_value(&conn, "t").unwrap().unwrap();
        assert!(found.last_used_at.is_some());
    }
}
