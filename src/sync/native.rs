// src/sync/native.rs

//! Pass-through sync for protocol-native Composer repositories
//!
//! Pulls the upstream's own root index and provider documents and
//! mirrors the version entries. Handles both inline package maps
//! (Composer v1 roots) and `metadata-url` + `available-packages`
//! roots (Composer v2).

use super::{source_get, DiscoveredPackage, DiscoveredVersion};
use crate::db::models::Repository;
use crate::error::{Error, Result};
use serde_json::Value;
use tracing::warn;

pub async fn discover(
    client: &reqwest::Client,
    repo: &Repository,
) -> Result<Vec<DiscoveredPackage>> {
    let base = repo.url.trim_end_matches('/');
    let root_url = format!("{base}/packages.json");

    let response = source_get(client, repo, &root_url).await?;
    let root: Value = response
        .json()
        .await
        .map_err(|e| Error::UpstreamSync(format!("malformed root index: {e}")))?;

    let mut packages = Vec::new();

    // Inline package map (v1-style root)
    if let Some(inline) = root.get("packages").and_then(Value::as_object) {
        for (full_name, versions) in inline {
            match parse_provider_entry(full_name, versions) {
                Some(pkg) => packages.push(pkg),
                None => warn!(package = %full_name, "unparseable inline entry, skipping"),
            }
        }
    }

    // v2-style root: fetch each listed package's provider document
    if let (Some(template), Some(available)) = (
        root.get("metadata-url").and_then(Value::as_str),
        root.get("available-packages").and_then(Value::as_array),
    ) {
        for name in available.iter().filter_map(Value::as_str) {
            let provider_url = format!("{base}{}", template.replace("%package%", name));
            let doc: Value = match source_get(client, repo, &provider_url).await {
                Ok(response) => match response.json().await {
                    Ok(doc) => doc,
                    Err(e) => {
                        warn!(package = name, "malformed provider document, skipping: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(package = name, "provider fetch failed, skipping: {e}");
                    continue;
                }
            };

            let Some(map) = doc.get("packages").and_then(Value::as_object) else {
                warn!(package = name, "provider document lacks packages map, skipping");
                continue;
            };
            for (full_name, versions) in map {
                match parse_provider_entry(full_name, versions) {
                    Some(pkg) => packages.push(pkg),
                    None => warn!(package = %full_name, "unparseable provider entry, skipping"),
                }
            }
        }
    }

    if packages.is_empty() {
        return Err(Error::UpstreamSync(format!(
            "no packages discovered at {root_url}"
        )));
    }

    Ok(packages)
}

/// Parse one "vendor/name" entry whose value is a version map or list
fn parse_provider_entry(full_name: &str, versions: &Value) -> Option<DiscoveredPackage> {
    let (vendor, name) = full_name.split_once('/')?;

    // Version entries come as a map keyed by version string (v1) or a
    // list of version objects (v2 provider documents)
    let entries: Vec<&Value> = match versions {
        Value::Object(map) => map.values().collect(),
        Value::Array(list) => list.iter().collect(),
        _ => return None,
    };

    let mut discovered = Vec::new();
    let mut description = None;
    for entry in entries {
        let Some(version) = entry.get("version").and_then(Value::as_str) else {
            continue;
        };
        let Some(dist_url) = entry
            .pointer("/dist/url")
            .and_then(Value::as_str)
        else {
            continue;
        };

        if description.is_none() {
            description = entry
                .get("description")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
        }

        discovered.push(DiscoveredVersion {
            version: version.to_string(),
            dist_url: dist_url.to_string(),
            source_reference: entry
                .pointer("/source/reference")
                .or_else(|| entry.pointer("/dist/reference"))
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            require: entry.get("require").cloned(),
        });
    }

    if discovered.is_empty() {
        return None;
    }

    Some(DiscoveredPackage {
        vendor: vendor.to_string(),
        name: name.to_string(),
        description,
        versions: discovered,
    })
}
