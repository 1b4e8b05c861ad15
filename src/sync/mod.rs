// src/sync/mod.rs

//! Repository synchronization engine
//!
//! Pulls package/version definitions from configured upstream sources.
//! Strategy selection is by source type:
//! - git-hosted sources use a two-tier strategy (bulk registry call
//!   for account-wide targets, manifest enumeration for named projects)
//! - protocol-native sources mirror the upstream's own documents
//! - flat-archive-index sources derive entries from archive filenames
//!
//! Discovered (package, version) pairs are upserted; versions known
//! from earlier runs but absent now are never deleted. A fatal error
//! marks the repository `error` with a message and leaves all prior
//! package data intact.

mod archive;
mod gitlab;
mod native;

use crate::cache::MetadataCache;
use crate::db::models::{Package, Repository, SourceType, Version};
use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// One version discovered during a sync run
#[derive(Debug, Clone)]
pub struct DiscoveredVersion {
    pub version: String,
    pub dist_url: String,
    pub source_reference: Option<String>,
    /// Declared dependency constraints, as a JSON object
    pub require: Option<serde_json::Value>,
}

/// One package discovered during a sync run
#[derive(Debug, Clone)]
pub struct DiscoveredPackage {
    pub vendor: String,
    pub name: String,
    pub description: Option<String>,
    pub versions: Vec<DiscoveredVersion>,
}

impl DiscoveredPackage {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }
}

/// Which strategy produced a sync result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Bulk registry call against the provider's hosted package API
    TierA,
    /// Per-manifest enumeration of a named project's file tree
    TierB,
    /// Pass-through mirroring of a protocol-native source
    Native,
    /// Filename-derived entries from a flat archive index
    ArchiveIndex,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStrategy::TierA => "tierA",
            SyncStrategy::TierB => "tierB",
            SyncStrategy::Native => "native",
            SyncStrategy::ArchiveIndex => "archive-index",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Full names of packages persisted by this run
    pub packages: Vec<String>,
    pub strategy: SyncStrategy,
}

/// Synchronization engine over the shared database and cache
#[derive(Clone)]
pub struct SyncEngine {
    db_path: PathBuf,
    cache: MetadataCache,
    client: reqwest::Client,
}

impl SyncEngine {
    pub fn new(db_path: PathBuf, cache: MetadataCache, client: reqwest::Client) -> Self {
        Self {
            db_path,
            cache,
            client,
        }
    }

    /// Run one sync for a repository, recording the outcome on its row
    ///
    /// Atomic per repository: on failure only status/error_message
    /// change; previously persisted packages and versions survive.
    pub async fn synchronize(&self, repository_id: i64) -> Result<SyncResult> {
        let conn = crate::db::open(&self.db_path)?;
        let mut repo = Repository::find_by_id(&conn, repository_id)?
            .ok_or_else(|| Error::NotFound(format!("unknown repository {repository_id}")))?;

        info!(
            repository = %repo.name,
            source_type = %repo.source_type,
            "starting sync"
        );
        repo.mark_syncing(&conn)?;
        drop(conn);

        match self.discover(&repo).await {
            Ok((packages, strategy)) => {
                let conn = crate::db::open(&self.db_path)?;
                let persisted = self.persist(&conn, &repo, packages)?;
                repo.mark_synced(&conn)?;
                drop(conn);

                for full_name in &persisted {
                    if let Some((vendor, name)) = full_name.split_once('/') {
                        self.cache.invalidate_package(vendor, name).await;
                    }
                }

                info!(
                    repository = %repo.name,
                    packages = persisted.len(),
                    strategy = %strategy,
                    "sync complete"
                );
                Ok(SyncResult {
                    packages: persisted,
                    strategy,
                })
            }
            Err(e) => {
                let message = e.to_string();
                warn!(repository = %repo.name, "sync failed: {message}");
                let conn = crate::db::open(&self.db_path)?;
                repo.mark_failed(&conn, &message)?;
                Err(Error::UpstreamSync(message))
            }
        }
    }

    /// Sync every repository that is due, recording failures per row
    ///
    /// Used by the scheduled loop; one failing repository never
    /// cascades to the others.
    pub async fn synchronize_due(&self) {
        let repos = {
            let conn = match crate::db::open(&self.db_path) {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("scheduled sync skipped, database unavailable: {e}");
                    return;
                }
            };
            match Repository::list_all(&conn) {
                Ok(repos) => repos,
                Err(e) => {
                    warn!("scheduled sync skipped, listing failed: {e}");
                    return;
                }
            }
        };

        for repo in repos.iter().filter(|r| r.needs_sync()) {
            let Some(id) = repo.id else { continue };
            // Errors are already recorded on the repository row
            let _ = self.synchronize(id).await;
        }
    }

    async fn discover(
        &self,
        repo: &Repository,
    ) -> Result<(Vec<DiscoveredPackage>, SyncStrategy)> {
        match repo.source_type {
            SourceType::GitLab => gitlab::discover(&self.client, repo).await,
            SourceType::Composer => {
                let packages = native::discover(&self.client, repo).await?;
                Ok((packages, SyncStrategy::Native))
            }
            SourceType::Artifact => {
                let packages = archive::discover(&self.client, repo).await?;
                Ok((packages, SyncStrategy::ArchiveIndex))
            }
        }
    }

    fn persist(
        &self,
        conn: &rusqlite::Connection,
        repo: &Repository,
        packages: Vec<DiscoveredPackage>,
    ) -> Result<Vec<String>> {
        let mut persisted = Vec::new();

        for discovered in packages {
            let full_name = discovered.full_name();
            if let Some(filter) = &repo.package_filter {
                if &full_name != filter {
                    continue;
                }
            }

            let pkg = Package::upsert(
                conn,
                repo.id,
                &discovered.vendor,
                &discovered.name,
                discovered.description.as_deref(),
            )?;
            let pkg_id = pkg.id.expect("upserted package has id");

            for v in discovered.versions {
                Version {
                    id: None,
                    package_id: pkg_id,
                    version: v.version,
                    dist_url: v.dist_url,
                    source_reference: v.source_reference,
                    require_json: v.require.map(|r| r.to_string()),
                    readme_url: None,
                    changelog_url: None,
                    created_at: None,
                }
                .upsert(conn)?;
            }

            persisted.push(full_name);
        }

        Ok(persisted)
    }
}

/// Issue a GET against an upstream source, applying its credentials
pub(crate) async fn source_get(
    client: &reqwest::Client,
    repo: &Repository,
    url: &str,
) -> Result<reqwest::Response> {
    let mut request = client.get(url);

    match repo.credential_type.as_deref() {
        Some("token") => {
            if let Some(token) = &repo.credential_token {
                // Forge APIs take the raw token header; others accept Bearer
                request = match repo.source_type {
                    SourceType::GitLab => request.header("PRIVATE-TOKEN", token),
                    _ => request.bearer_auth(token),
                };
            }
        }
        Some("basic") => {
            if let Some(user) = &repo.credential_user {
                request = request.basic_auth(user, repo.credential_password.as_deref());
            }
        }
        _ => {}
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::UpstreamSync(format!("failed to fetch {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::UpstreamSync(format!(
            "HTTP {} from {url}",
            response.status()
        )));
    }

    Ok(response)
}
