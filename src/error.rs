// src/error.rs

//! Crate-wide error type and result alias

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing, invalid, or expired credential
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Per-credential hourly ceiling exceeded
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Unknown package, version, or artifact
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or parse failure while contacting a sync source
    #[error("upstream sync failed: {0}")]
    UpstreamSync(String),

    /// Origin fetch failure on the artifact path
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// Object store unreachable or write/read failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed sync configuration
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
