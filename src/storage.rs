// src/storage.rs

//! Object store for mirrored artifact blobs
//!
//! Blobs are stored on the local filesystem under their derived key,
//! written atomically (temp file + rename) so concurrent readers never
//! observe a partial artifact. The core never proactively deletes
//! blobs; cleanup is an external concern.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed object store keyed by relative path
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Storage key for one artifact blob
    pub fn artifact_key(repo_segment: &str, vendor: &str, package: &str, filename: &str) -> String {
        format!("dist/{repo_segment}/{vendor}/{package}/{filename}")
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are server-derived, but refuse traversal anyway
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(Error::Storage(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(key))
    }

    /// Check whether a blob exists
    pub async fn contains(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Read a blob; absent keys are NotFound
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("no stored artifact at '{key}'")))
            }
            Err(e) => Err(Error::Storage(format!("failed to read '{key}': {e}"))),
        }
    }

    /// Write a blob atomically, returning its sha256 digest
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("failed to create {}: {e}", parent.display())))?;
        }

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, data)
            .await
            .map_err(|e| Error::Storage(format!("failed to write '{key}': {e}")))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::Storage(format!("failed to finalize '{key}': {e}")))?;

        let digest = hex_digest(data);
        debug!(key = key, bytes = data.len(), sha256 = %digest, "stored artifact blob");
        Ok(digest)
    }

    /// Root directory, for logging and diagnostics
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
