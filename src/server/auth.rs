// src/server/auth.rs

//! Credential validation and per-token rate limiting
//!
//! Document endpoints require a valid, non-expired package-tool token
//! with at least readonly permission. Artifact endpoints additionally
//! accept an administrative session bearer, since both automated
//! builds and dashboard-triggered downloads hit them. Sessions are
//! exempt from the hourly counter.

use crate::db::models::{Session, Token};
use crate::error::{Error, Result};
use crate::kv::KvStore;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::Engine;
use chrono::{Timelike, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Endpoint class being guarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Root index and provider documents: token only
    Document,
    /// Artifact downloads: token or administrative session
    Artifact,
}

/// Who passed the gate
#[derive(Debug, Clone)]
pub enum AuthContext {
    Token(Token),
    AdminSession,
}

/// Per-token hourly counters in the shared store
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<KvStore>,
}

impl RateLimiter {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Count one request against the token's ceiling
    ///
    /// Counters are keyed by (token, wall-clock hour) so a window
    /// expires as a whole. Best-effort: concurrent bursts may overshoot
    /// the ceiling by a small margin.
    pub async fn check(&self, token: &Token) -> Result<()> {
        let Some(ceiling) = token.ceiling() else {
            return Ok(());
        };

        let now = Utc::now();
        let key = format!(
            "rl:{}:{}",
            token.id.unwrap_or_default(),
            now.format("%Y%m%d%H")
        );
        let count = self
            .kv
            .increment(&key, Some(Duration::from_secs(3600)))
            .await;

        if count > ceiling {
            let retry_after_secs = 3600 - u64::from(now.minute() * 60 + now.second());
            return Err(Error::RateLimitExceeded { retry_after_secs });
        }
        Ok(())
    }
}

/// Extract the presented credential from an Authorization header
///
/// Package tools present the token as Basic (token in the password
/// slot) or Bearer; sessions are always Bearer.
fn presented_credential(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;

    if let Some(encoded) = raw.strip_prefix("Basic ") {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        let pair = String::from_utf8(decoded).ok()?;
        // "user:token"; the user part is conventional and ignored
        let (_, password) = pair.split_once(':')?;
        return Some(password.to_string());
    }

    raw.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

/// Validate the request's credential for the given endpoint class
///
/// On success the token's last-used timestamp is bumped and (for
/// tokens) the hourly counter consulted.
pub async fn authenticate(
    db_path: &Path,
    rate_limiter: &RateLimiter,
    headers: &HeaderMap,
    mode: AuthMode,
) -> Result<AuthContext> {
    let credential = presented_credential(headers)
        .ok_or_else(|| Error::Auth("missing credentials".to_string()))?;

    let conn = crate::db::open(db_path)?;

    if let Some(token) = Token::find_by_value(&conn, &credential)? {
        if token.is_expired() {
            return Err(Error::Auth("token expired".to_string()));
        }
        token.touch(&conn)?;
        drop(conn);
        rate_limiter.check(&token).await?;
        return Ok(AuthContext::Token(token));
    }

    if mode == AuthMode::Artifact {
        if let Some(session) = Session::find_by_value(&conn, &credential)? {
            if session.is_expired() {
                return Err(Error::Auth("session expired".to_string()));
            }
            return Ok(AuthContext::AdminSession);
        }
    }

    Err(Error::Auth("invalid credentials".to_string()))
}
