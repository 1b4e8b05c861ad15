// src/db/models/repository.rs

//! Repository model - upstream package sources

use crate::db::current_timestamp;
use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt;
use std::str::FromStr;

/// How package definitions are discovered from this source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// Git-hosted source with a two-tier sync strategy
    GitLab,
    /// Protocol-native Composer repository (pass-through mirroring)
    Composer,
    /// Flat index of archive files
    Artifact,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::GitLab => "gitlab",
            SourceType::Composer => "composer",
            SourceType::Artifact => "artifact",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gitlab" => Ok(SourceType::GitLab),
            "composer" => Ok(SourceType::Composer),
            "artifact" => Ok(SourceType::Artifact),
            other => Err(Error::Validation(format!("unknown source type '{other}'"))),
        }
    }
}

/// Sync lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryStatus {
    Pending,
    Active,
    Error,
    Syncing,
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepositoryStatus::Pending => "pending",
            RepositoryStatus::Active => "active",
            RepositoryStatus::Error => "error",
            RepositoryStatus::Syncing => "syncing",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RepositoryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RepositoryStatus::Pending),
            "active" => Ok(RepositoryStatus::Active),
            "error" => Ok(RepositoryStatus::Error),
            "syncing" => Ok(RepositoryStatus::Syncing),
            other => Err(Error::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Repository represents an upstream source of package definitions
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    pub credential_type: Option<String>,
    pub credential_token: Option<String>,
    pub credential_user: Option<String>,
    pub credential_password: Option<String>,
    /// Account/group the source belongs to (git-hosted sources)
    pub account: Option<String>,
    /// A specific named repository; absent = account-wide target
    pub project: Option<String>,
    /// Glob filter for manifest paths during tree enumeration
    pub path_filter: Option<String>,
    /// Restrict discovery to packages matching this name
    pub package_filter: Option<String>,
    /// Target branch for git-hosted manifest discovery
    pub branch: Option<String>,
    /// Seconds between scheduled sync runs
    pub sync_interval: i64,
    pub status: RepositoryStatus,
    pub error_message: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new repository configuration
    pub fn new(name: String, url: String, source_type: SourceType) -> Self {
        Self {
            id: None,
            name,
            url,
            source_type,
            credential_type: None,
            credential_token: None,
            credential_user: None,
            credential_password: None,
            account: None,
            project: None,
            path_filter: None,
            package_filter: None,
            branch: None,
            sync_interval: 3600,
            status: RepositoryStatus::Pending,
            error_message: None,
            last_synced_at: None,
            created_at: None,
        }
    }

    const COLUMNS: &'static str = "id, name, url, source_type, credential_type, credential_token, \
         credential_user, credential_password, account, project, path_filter, package_filter, \
         branch, sync_interval, status, error_message, last_synced_at, created_at";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let source_type: String = row.get(3)?;
        let status: String = row.get(14)?;
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            url: row.get(2)?,
            source_type: source_type.parse().map_err(|_| {
                rusqlite::Error::InvalidColumnType(3, "source_type".into(), rusqlite::types::Type::Text)
            })?,
            credential_type: row.get(4)?,
            credential_token: row.get(5)?,
            credential_user: row.get(6)?,
            credential_password: row.get(7)?,
            account: row.get(8)?,
            project: row.get(9)?,
            path_filter: row.get(10)?,
            package_filter: row.get(11)?,
            branch: row.get(12)?,
            sync_interval: row.get(13)?,
            status: status.parse().map_err(|_| {
                rusqlite::Error::InvalidColumnType(14, "status".into(), rusqlite::types::Type::Text)
            })?,
            error_message: row.get(15)?,
            last_synced_at: row.get(16)?,
            created_at: row.get(17)?,
        })
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, url, source_type, credential_type, credential_token,
                credential_user, credential_password, account, project, path_filter,
                package_filter, branch, sync_interval, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &self.name,
                &self.url,
                self.source_type.to_string(),
                &self.credential_type,
                &self.credential_token,
                &self.credential_user,
                &self.credential_password,
                &self.account,
                &self.project,
                &self.path_filter,
                &self.package_filter,
                &self.branch,
                self.sync_interval,
                self.status.to_string(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repositories WHERE id = ?1",
            Self::COLUMNS
        ))?;
        Ok(stmt.query_row([id], Self::from_row).optional()?)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repositories WHERE name = ?1",
            Self::COLUMNS
        ))?;
        Ok(stmt.query_row([name], Self::from_row).optional()?)
    }

    /// List all repositories
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repositories ORDER BY name",
            Self::COLUMNS
        ))?;
        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Mark a sync run as started
    pub fn mark_syncing(&mut self, conn: &Connection) -> Result<()> {
        self.status = RepositoryStatus::Syncing;
        self.update_status(conn)
    }

    /// Record a successful sync run
    pub fn mark_synced(&mut self, conn: &Connection) -> Result<()> {
        self.status = RepositoryStatus::Active;
        self.error_message = None;
        self.last_synced_at = Some(current_timestamp());
        self.update_status(conn)
    }

    /// Record a failed sync run; prior package data is left untouched
    pub fn mark_failed(&mut self, conn: &Connection, message: &str) -> Result<()> {
        self.status = RepositoryStatus::Error;
        self.error_message = Some(message.to_string());
        self.update_status(conn)
    }

    fn update_status(&self, conn: &Connection) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::Validation("cannot update repository without ID".to_string()))?;

        conn.execute(
            "UPDATE repositories SET status = ?1, error_message = ?2, last_synced_at = ?3
             WHERE id = ?4",
            params![
                self.status.to_string(),
                &self.error_message,
                &self.last_synced_at,
                id
            ],
        )?;
        Ok(())
    }

    /// Check if this repository is due for a scheduled sync
    pub fn needs_sync(&self) -> bool {
        match &self.last_synced_at {
            None => true,
            Some(last) => match chrono::DateTime::parse_from_rfc3339(last) {
                Ok(dt) => {
                    let age = chrono::Utc::now().signed_duration_since(dt);
                    age.num_seconds() > self.sync_interval
                }
                Err(_) => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_find() {
        let conn = create_test_db();

        let mut repo = Repository::new(
            "acme".to_string(),
            "https://gitlab.example.com".to_string(),
            SourceType::GitLab,
        );
        repo.account = Some("acme".to_string());
        let id = repo.insert(&conn).unwrap();

        let found = Repository::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.name, "acme");
        assert_eq!(found.source_type, SourceType::GitLab);
        assert_eq!(found.status, RepositoryStatus::Pending);
        assert_eq!(found.account.as_deref(), Some("acme"));
    }

    #[test]
    fn test_status_transitions() {
        let conn = create_test_db();

        let mut repo = Repository::new(
            "mirror".to_string(),
            "https://packagist.org".to_string(),
            SourceType::Composer,
        );
        repo.insert(&conn).unwrap();

        repo.mark_syncing(&conn).unwrap();
        let found = Repository::find_by_name(&conn, "mirror").unwrap().unwrap();
        assert_eq!(found.status, RepositoryStatus::Syncing);

        repo.mark_failed(&conn, "connection refused").unwrap();
        let found = Repository::find_by_name(&conn, "mirror").unwrap().unwrap();
        assert_eq!(found.status, RepositoryStatus::Error);
        assert_eq!(found.error_message.as_deref(), Some("connection refused"));

        repo.mark_synced(&conn).unwrap();
        let found = Repository::find_by_name(&conn, "mirror").unwrap().unwrap();
        assert_eq!(found.status, RepositoryStatus::Active);
        assert!(found.error_message.is_none());
        assert!(found.last_synced_at.is_some());
    }

    #[test]
    fn test_needs_sync() {
        let mut repo = Repository::new(
            "r".to_string(),
            "https://example.com".to_string(),
            SourceType::Composer,
        );
        assert!(repo.needs_sync());

        repo.last_synced_at = Some(current_timestamp());
        assert!(!repo.needs_sync());
    }
}
