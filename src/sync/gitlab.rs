// src/sync/gitlab.rs

//! Two-tier sync strategy for git-hosted sources (GitLab-shaped API)
//!
//! Tier A: when the target is an entire account (no project named),
//! one bulk call against the hosted package-registry API discovers
//! everything at once. A failure here is terminal - with no project
//! there is no fallback target.
//!
//! Tier B: when a specific project is named, Tier A is skipped
//! entirely. The project's file tree is enumerated, entries are
//! filtered against the configured manifest path glob (default:
//! composer.json at any depth), and each matching manifest is fetched
//! and parsed. Manifests that fail to parse are skipped; partial
//! discovery is a success.

use super::{source_get, DiscoveredPackage, DiscoveredVersion, SyncStrategy};
use crate::db::models::Repository;
use crate::error::{Error, Result};
use glob::Pattern;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default manifest filter: composer.json at any depth
pub const DEFAULT_PATH_FILTER: &str = "**/composer.json";

const DEFAULT_BRANCH: &str = "main";

pub async fn discover(
    client: &reqwest::Client,
    repo: &Repository,
) -> Result<(Vec<DiscoveredPackage>, SyncStrategy)> {
    let account = repo
        .account
        .as_deref()
        .ok_or_else(|| Error::Validation("git-hosted source requires an account".to_string()))?;

    match repo.project.as_deref() {
        // Tier A: account-wide bulk registry call, no fallback target
        None => {
            let packages = discover_registry(client, repo, account).await?;
            Ok((packages, SyncStrategy::TierA))
        }
        // Tier B: named project, Tier A skipped entirely
        Some(project) => {
            let packages = discover_manifests(client, repo, account, project).await?;
            Ok((packages, SyncStrategy::TierB))
        }
    }
}

/// One entry from the bulk package-registry listing
#[derive(Debug, Deserialize)]
struct RegistryEntry {
    name: String,
    version: String,
    #[serde(default)]
    dist_url: Option<String>,
}

/// Tier A: bulk call against the hosted package-registry API
async fn discover_registry(
    client: &reqwest::Client,
    repo: &Repository,
    account: &str,
) -> Result<Vec<DiscoveredPackage>> {
    let url = format!(
        "{}/api/v4/groups/{}/packages?package_type=composer&per_page=100",
        repo.url.trim_end_matches('/'),
        account
    );

    let response = source_get(client, repo, &url).await?;
    let entries: Vec<RegistryEntry> = response
        .json()
        .await
        .map_err(|e| Error::UpstreamSync(format!("malformed registry listing: {e}")))?;

    let mut packages: Vec<DiscoveredPackage> = Vec::new();
    for entry in entries {
        let Some((vendor, name)) = entry.name.split_once('/') else {
            debug!(name = %entry.name, "registry entry without vendor prefix, skipping");
            continue;
        };

        let dist_url = entry.dist_url.unwrap_or_else(|| {
            format!(
                "{}/api/v4/groups/{}/-/packages/composer/{}/{}/archive.zip",
                repo.url.trim_end_matches('/'),
                account,
                entry.name,
                entry.version
            )
        });

        let version = DiscoveredVersion {
            version: entry.version,
            dist_url,
            source_reference: None,
            require: None,
        };

        match packages
            .iter_mut()
            .find(|p| p.vendor == vendor && p.name == name)
        {
            Some(existing) => existing.versions.push(version),
            None => packages.push(DiscoveredPackage {
                vendor: vendor.to_string(),
                name: name.to_string(),
                description: None,
                versions: vec![version],
            }),
        }
    }

    Ok(packages)
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Composer manifest fields used for discovery
#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    require: Option<serde_json::Value>,
}

/// Tier B: enumerate the project tree and parse matching manifests
async fn discover_manifests(
    client: &reqwest::Client,
    repo: &Repository,
    account: &str,
    project: &str,
) -> Result<Vec<DiscoveredPackage>> {
    let base = repo.url.trim_end_matches('/');
    let project_path = encode_path_segment(&format!("{account}/{project}"));
    let branch = repo.branch.as_deref().unwrap_or(DEFAULT_BRANCH);

    let tree_url = format!(
        "{base}/api/v4/projects/{project_path}/repository/tree?recursive=true&per_page=100&ref={branch}"
    );
    let response = source_get(client, repo, &tree_url).await?;
    let tree: Vec<TreeEntry> = response
        .json()
        .await
        .map_err(|e| Error::UpstreamSync(format!("malformed tree listing: {e}")))?;

    let filter = repo.path_filter.as_deref().unwrap_or(DEFAULT_PATH_FILTER);
    let matcher = manifest_matcher(filter)?;

    let mut packages = Vec::new();
    for entry in tree {
        if entry.kind != "blob" || !matcher(&entry.path) {
            continue;
        }

        let file_url = format!(
            "{base}/api/v4/projects/{project_path}/repository/files/{}/raw?ref={branch}",
            encode_path_segment(&entry.path)
        );

        let body = match source_get(client, repo, &file_url).await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %entry.path, "failed to read manifest, skipping: {e}");
                    continue;
                }
            },
            Err(e) => {
                warn!(path = %entry.path, "failed to fetch manifest, skipping: {e}");
                continue;
            }
        };

        let manifest: Manifest = match serde_json::from_str(&body) {
            Ok(manifest) => manifest,
            Err(e) => {
                // Partial discovery is a success, not a failure
                warn!(path = %entry.path, "unparseable manifest, skipping: {e}");
                continue;
            }
        };

        let Some((vendor, name)) = manifest.name.split_once('/') else {
            warn!(path = %entry.path, name = %manifest.name, "manifest name lacks vendor, skipping");
            continue;
        };

        // A manifest without an explicit version describes the branch
        let version = manifest
            .version
            .clone()
            .unwrap_or_else(|| format!("dev-{branch}"));

        let dist_url = format!(
            "{base}/api/v4/projects/{project_path}/repository/archive.zip?sha={branch}"
        );

        packages.push(DiscoveredPackage {
            vendor: vendor.to_string(),
            name: name.to_string(),
            description: manifest.description,
            versions: vec![DiscoveredVersion {
                version,
                dist_url,
                source_reference: Some(branch.to_string()),
                require: manifest.require,
            }],
        });
    }

    Ok(packages)
}

/// Build a path matcher from a glob filter
///
/// A `**/`-prefixed pattern also matches files at the repository root,
/// so the default filter catches a top-level composer.json.
fn manifest_matcher(filter: &str) -> Result<impl Fn(&str) -> bool> {
    let pattern = Pattern::new(filter)
        .map_err(|e| Error::Validation(format!("invalid path filter '{filter}': {e}")))?;
    let root_pattern = filter
        .strip_prefix("**/")
        .and_then(|rest| Pattern::new(rest).ok());

    Ok(move |path: &str| {
        pattern.matches(path)
            || root_pattern
                .as_ref()
                .is_some_and(|root| root.matches(path))
    })
}

/// Percent-encode a path for use as one URL segment
fn encode_path_segment(path: &str) -> String {
    path.replace('%', "%25").replace('/', "%2F")
}
