// src/server/documents.rs

//! Provider and root index document assembly
//!
//! Documents are computed from the database and cached. Reads go
//! through the shape-validated cache; a hit is additionally checked
//! against the backing data's last-modified timestamp via the
//! freshness marker, so a re-synced package forces a recompute before
//! the TTL runs out.

use crate::cache::{provider_key, ROOT_INDEX_KEY};
use crate::db::models::{Package, Version};
use crate::error::{Error, Result};
use crate::server::ServerState;
use crate::version::{is_dev_version, sort_for_listing};
use serde_json::{json, Value};

/// Build (or fetch) the root index document
pub async fn root_index(state: &ServerState) -> Result<Value> {
    let conn = crate::db::open(&state.config.db_path)?;
    let last_modified: Option<String> = conn
        .query_row("SELECT MAX(last_modified_at) FROM packages", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    let last_modified = last_modified.unwrap_or_default();

    if let Some(cached) = state.cache.get_document(ROOT_INDEX_KEY).await {
        if state.cache.freshness(ROOT_INDEX_KEY).await.as_deref() == Some(last_modified.as_str()) {
            return Ok(cached);
        }
    }

    let names: Vec<String> = Package::list_all(&conn)?
        .iter()
        .map(Package::full_name)
        .collect();
    drop(conn);

    let document = json!({
        "metadata-url": "/p2/%package%.json",
        "available-packages": names,
        "last-update": crate::db::current_timestamp(),
    });

    state
        .cache
        .put_document(ROOT_INDEX_KEY, &document, &last_modified)
        .await;
    Ok(document)
}

/// Build (or fetch) a provider document for one package variant
///
/// The stable channel lists tagged versions; the dev channel lists
/// branch versions (`dev-*` / `*-dev`). Both are strictly descending
/// by semantic precedence, non-semver entries last.
pub async fn provider_document(
    state: &ServerState,
    vendor: &str,
    package: &str,
    dev: bool,
) -> Result<Value> {
    let conn = crate::db::open(&state.config.db_path)?;
    let pkg = Package::find(&conn, vendor, package)?
        .ok_or_else(|| Error::NotFound(format!("unknown package {vendor}/{package}")))?;
    let last_modified = pkg.last_modified_at.clone().unwrap_or_default();

    let key = provider_key(vendor, package, dev);
    if let Some(cached) = state.cache.get_document(&key).await {
        if state.cache.freshness(&key).await.as_deref() == Some(last_modified.as_str()) {
            return Ok(cached);
        }
    }

    let mut versions: Vec<Version> = Version::list_for_package(&conn, pkg.id.expect("loaded"))?
        .into_iter()
        .filter(|v| is_dev_version(&v.version) == dev)
        .collect();
    drop(conn);

    sort_for_listing(&mut versions, |v| v.version.as_str());

    let full_name = pkg.full_name();
    let entries: Vec<Value> = versions
        .iter()
        .map(|v| version_entry(&full_name, vendor, package, v))
        .collect();

    let document = json!({
        "packages": { &full_name: entries },
    });

    state
        .cache
        .put_document(&key, &document, &last_modified)
        .await;
    Ok(document)
}

/// One version object in a provider document
///
/// The dist URL points back at this server's mirror endpoint, so the
/// client downloads through the pull-through cache.
fn version_entry(full_name: &str, vendor: &str, package: &str, v: &Version) -> Value {
    let mut entry = json!({
        "name": full_name,
        "version": v.version,
        "dist": {
            "type": "zip",
            "url": format!("/dist/m/{vendor}/{package}/{}", v.version),
        },
    });

    if let Some(reference) = &v.source_reference {
        entry["dist"]["reference"] = json!(reference);
        entry["source"] = json!({
            "reference": reference,
            "type": "git",
        });
    }
    if let Some(require) = &v.require_json {
        if let Ok(parsed) = serde_json::from_str::<Value>(require) {
            entry["require"] = parsed;
        }
    }
    if let Some(time) = &v.created_at {
        entry["time"] = json!(time);
    }

    entry
}
