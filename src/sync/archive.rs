// src/sync/archive.rs

//! Sync strategy for flat archive indexes
//!
//! The upstream exposes a JSON listing of archive files; package and
//! version are derived from `name-version.ext` filenames. Filenames
//! that do not follow the convention are skipped. The vendor comes
//! from the repository's account (falling back to its name), since a
//! flat index carries no vendor of its own.

use super::{source_get, DiscoveredPackage, DiscoveredVersion};
use crate::db::models::Repository;
use crate::error::{Error, Result};
use serde_json::Value;
use tracing::debug;

const ARCHIVE_EXTENSIONS: [&str; 4] = [".tar.gz", ".tgz", ".zip", ".tar"];

pub async fn discover(
    client: &reqwest::Client,
    repo: &Repository,
) -> Result<Vec<DiscoveredPackage>> {
    let base = repo.url.trim_end_matches('/');

    let response = source_get(client, repo, base).await?;
    let listing: Value = response
        .json()
        .await
        .map_err(|e| Error::UpstreamSync(format!("malformed archive index: {e}")))?;

    let files = listing
        .as_array()
        .ok_or_else(|| Error::UpstreamSync("archive index is not a list".to_string()))?;

    let vendor = repo
        .account
        .clone()
        .unwrap_or_else(|| repo.name.clone());

    let mut packages: Vec<DiscoveredPackage> = Vec::new();
    for file in files {
        // Entries are either bare filename strings or {"file", "url"} objects
        let (filename, url) = match file {
            Value::String(name) => (name.as_str(), None),
            Value::Object(obj) => {
                let Some(name) = obj.get("file").and_then(Value::as_str) else {
                    continue;
                };
                (name, obj.get("url").and_then(Value::as_str))
            }
            _ => continue,
        };

        let Some((name, version)) = split_archive_filename(filename) else {
            debug!(file = filename, "non-conforming archive filename, skipping");
            continue;
        };

        let dist_url = url
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("{base}/{filename}"));

        let discovered = DiscoveredVersion {
            version: version.to_string(),
            dist_url,
            source_reference: None,
            require: None,
        };

        match packages.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.versions.push(discovered),
            None => packages.push(DiscoveredPackage {
                vendor: vendor.clone(),
                name: name.to_string(),
                description: None,
                versions: vec![discovered],
            }),
        }
    }

    Ok(packages)
}

/// Split `name-version.ext` into (name, version)
///
/// The version starts at the last dash followed by a digit, so dashed
/// package names ("my-tool-1.2.0.tar.gz") parse correctly.
fn split_archive_filename(filename: &str) -> Option<(&str, &str)> {
    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(ext))?;

    let mut split_at = None;
    for (idx, _) in stem.match_indices('-') {
        if stem[idx + 1..].chars().next().is_some_and(|c| c.is_ascii_digit()) {
            split_at = Some(idx);
        }
    }

    let idx = split_at?;
    let (name, version) = (&stem[..idx], &stem[idx + 1..]);
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SourceType;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_split_archive_filename() {
        assert_eq!(
            split_archive_filename("widget-1.0.0.tar.gz"),
            Some(("widget", "1.0.0"))
        );
        assert_eq!(
            split_archive_filename("my-tool-1.2.0.zip"),
            Some(("my-tool", "1.2.0"))
        );
        assert_eq!(
            split_archive_filename("widget-2.0.0-beta1.tgz"),
            Some(("widget", "2.0.0-beta1"))
        );
        assert_eq!(split_archive_filename("README.md"), None);
        assert_eq!(split_archive_filename("no-version.zip"), None);
    }

    #[tokio::test]
    async fn test_discover_from_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                "widget-1.0.0.tar.gz",
                "widget-1.1.0.tar.gz",
                {"file": "gadget-2.0.0.zip", "url": "https://cdn.example.com/gadget-2.0.0.zip"},
                "notes.txt"
            ])))
            .mount(&server)
            .await;

        let mut repo = Repository::new(
            "archives".to_string(),
            server.uri(),
            SourceType::Artifact,
        );
        repo.account = Some("acme".to_string());

        let packages = discover(&reqwest::Client::new(), &repo).await.unwrap();

        assert_eq!(packages.len(), 2);
        let widget = packages.iter().find(|p| p.name == "widget").unwrap();
        assert_eq!(widget.vendor, "acme");
        assert_eq!(widget.versions.len(), 2);

        let gadget = packages.iter().find(|p| p.name == "gadget").unwrap();
        assert_eq!(
            gadget.versions[0].dist_url,
            "https://cdn.example.com/gadget-2.0.0.zip"
        );
    }

    #[tokio::test]
    async fn test_non_list_index_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .mount(&server)
            .await;

        let repo = Repository::new(
            "archives".to_string(),
            server.uri(),
            SourceType::Artifact,
        );
        let err = discover(&reqwest::Client::new(), &repo).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamSync(_)));
    }
}
