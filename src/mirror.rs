// src/mirror.rs

//! Pull-through artifact mirroring
//!
//! Resolves an artifact locator to bytes: stored blobs are served
//! directly; on a miss the bytes are fetched from the origin URL
//! recorded against the version and handed to the caller immediately,
//! while a deferred task persists them to storage. A failed deferred
//! write is logged and never retried; the next miss simply refetches.

use crate::db::models::{Package, Repository, Version};
use crate::error::{Error, Result};
use crate::storage::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed content type for served archives
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// How the target repository is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocator {
    /// Repository id carried in the request path
    Direct { repository_id: i64 },
    /// Repository id resolved from stored package data
    Mirror,
    /// Explicit source reference recorded by a dependent project
    Lockfile { reference: String },
}

/// A resolved artifact ready to serve
#[derive(Debug, Clone)]
pub struct ArtifactHit {
    pub bytes: Vec<u8>,
    /// Normalized `{package}-{version}.zip` download filename
    pub filename: String,
}

/// Fetch-or-serve artifact resolver
#[derive(Clone)]
pub struct ArtifactMirror {
    db_path: PathBuf,
    storage: Arc<ObjectStore>,
    client: reqwest::Client,
}

impl ArtifactMirror {
    pub fn new(db_path: PathBuf, storage: Arc<ObjectStore>, client: reqwest::Client) -> Self {
        Self {
            db_path,
            storage,
            client,
        }
    }

    /// Resolve a locator to artifact bytes
    ///
    /// The three locator forms differ only in how the repository
    /// segment and version row are found; all converge on the same
    /// fetch-or-serve path.
    pub async fn resolve(
        &self,
        locator: &ArtifactLocator,
        vendor: &str,
        package: &str,
        version: &str,
    ) -> Result<ArtifactHit> {
        let conn = crate::db::open(&self.db_path)?;

        let pkg = Package::find(&conn, vendor, package)?
            .ok_or_else(|| Error::NotFound(format!("unknown package {vendor}/{package}")))?;
        let pkg_id = pkg.id.expect("loaded package has id");

        let (row, repo_segment, key_suffix) = match locator {
            ArtifactLocator::Direct { repository_id } => {
                // The id must name a configured repository
                Repository::find_by_id(&conn, *repository_id)?.ok_or_else(|| {
                    Error::NotFound(format!("unknown repository {repository_id}"))
                })?;
                let row = Version::find(&conn, pkg_id, version)?;
                (row, repository_id.to_string(), None)
            }
            ArtifactLocator::Mirror => {
                let segment = pkg
                    .repository_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "m".to_string());
                let row = Version::find(&conn, pkg_id, version)?;
                (row, segment, None)
            }
            ArtifactLocator::Lockfile { reference } => {
                let segment = pkg
                    .repository_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "m".to_string());
                // Prefer the pinned reference; fall back to the version
                // string when the reference has since been rewritten
                let row = match Version::find_by_reference(&conn, pkg_id, reference)? {
                    Some(row) => Some(row),
                    None => Version::find(&conn, pkg_id, version)?,
                };
                (row, segment, Some(short_reference(reference)))
            }
        };
        drop(conn);

        let row = row.ok_or_else(|| {
            Error::NotFound(format!("unknown version {vendor}/{package} {version}"))
        })?;

        let filename = format!("{}-{}.zip", package, row.version);
        let stored_name = match &key_suffix {
            Some(suffix) => format!("{}-{}-{}.zip", package, row.version, suffix),
            None => filename.clone(),
        };
        let key = ObjectStore::artifact_key(&repo_segment, vendor, package, &stored_name);

        if self.storage.contains(&key).await {
            debug!(key = %key, "serving artifact from storage");
            let bytes = self.storage.get(&key).await?;
            return Ok(ArtifactHit { bytes, filename });
        }

        info!(key = %key, origin = %row.dist_url, "artifact miss, fetching from origin");
        let bytes = self.fetch_origin(&row.dist_url).await?;

        // Deferred write: the client response is not delayed by storage
        let storage = self.storage.clone();
        let stored = bytes.clone();
        tokio::spawn(async move {
            match storage.put(&key, &stored).await {
                Ok(digest) => debug!(key = %key, sha256 = %digest, "mirrored artifact"),
                Err(e) => warn!(key = %key, "deferred artifact write failed: {e}"),
            }
        });

        Ok(ArtifactHit { bytes, filename })
    }

    async fn fetch_origin(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamFetch(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("failed to read {url}: {e}")))?;

        Ok(bytes.to_vec())
    }
}

/// Shorten a git reference for use in a storage key
fn short_reference(reference: &str) -> String {
    reference.chars().take(12).collect()
}
