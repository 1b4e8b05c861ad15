// src/cache.rs

//! Self-healing document cache
//!
//! Computed provider documents are cached as JSON text in the shared
//! key/value store. Every read is shape-validated before use: a value
//! that parses to anything other than an object or array is corrupt
//! (double-encoding, truncation, tampering - the cause does not
//! matter), so the entry is deleted and the read reported as a miss.
//! Callers then recompute from the database, which is the source of
//! truth. A freshness marker co-located at `key:metadata` records the
//! last-modified timestamp of the backing data so staleness can be
//! detected without waiting for TTL expiry.

use crate::kv::KvStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default TTL for cached documents
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache key for the root index document
pub const ROOT_INDEX_KEY: &str = "root";

/// Cache key for a provider document variant
pub fn provider_key(vendor: &str, package: &str, dev: bool) -> String {
    if dev {
        format!("p2:{vendor}/{package}~dev")
    } else {
        format!("p2:{vendor}/{package}")
    }
}

fn metadata_key(key: &str) -> String {
    format!("{key}:metadata")
}

/// Shape-validated cache of computed documents
#[derive(Clone)]
pub struct MetadataCache {
    kv: Arc<KvStore>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self {
            kv,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(kv: Arc<KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Get a cached document, self-healing corrupt entries
    ///
    /// Returns None on miss, expiry, or any value that fails the shape
    /// check; the corrupt entry (and its marker) is deleted first.
    pub async fn get_document(&self, key: &str) -> Option<Value> {
        let raw = self.kv.get(key).await?;

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() || value.is_array() => Some(value),
            Ok(value) => {
                warn!(
                    key = key,
                    shape = shape_name(&value),
                    "cached document has invalid shape, discarding"
                );
                self.purge(key).await;
                None
            }
            Err(e) => {
                warn!(key = key, "cached document is unparseable ({e}), discarding");
                self.purge(key).await;
                None
            }
        }
    }

    /// Store a document and its freshness marker
    pub async fn put_document(&self, key: &str, value: &Value, last_modified: &str) {
        self.kv
            .put(key, value.to_string(), Some(self.ttl))
            .await;
        self.kv
            .put(&metadata_key(key), last_modified.to_string(), Some(self.ttl))
            .await;
    }

    /// Read the freshness marker for a key
    ///
    /// Compared by callers against the backing row's last-modified
    /// timestamp to force a recompute before the TTL runs out.
    pub async fn freshness(&self, key: &str) -> Option<String> {
        self.kv.get(&metadata_key(key)).await
    }

    /// Delete a cached document and its marker
    pub async fn purge(&self, key: &str) {
        self.kv.delete(key).await;
        self.kv.delete(&metadata_key(key)).await;
    }

    /// Drop both provider variants for a package plus the root index
    ///
    /// Called after a repository re-sync touches the package.
    pub async fn invalidate_package(&self, vendor: &str, package: &str) {
        self.purge(&provider_key(vendor, package, false)).await;
        self.purge(&provider_key(vendor, package, true)).await;
        self.purge(ROOT_INDEX_KEY).await;
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> MetadataCache {
        MetadataCache::new(Arc::new(KvStore::new()))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = cache();
        let doc = json!({"packages": {"acme/widget": []}});

        cache
            .put_document("p2:acme/widget", &doc, "2026-01-01T00:00:00+00:00")
            .await;

        let read = cache.get_document("p2:acme/widget").await.unwrap();
        assert_eq!(read, doc);
        assert_eq!(
            cache.freshness("p2:acme/widget").await.as_deref(),
            Some("2026-01-01T00:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_bare_string_is_purged_and_missed() {
        let kv = Arc::new(KvStore::new());
        let cache = MetadataCache::new(kv.clone());

        // A double-encoded document decodes to a JSON string, not an object
        kv.put("p2:acme/widget", "\"{\\\"packages\\\":{}}\"".to_string(), None)
            .await;

        assert!(cache.get_document("p2:acme/widget").await.is_none());
        // Entry was deleted, not just skipped
        assert!(kv.get("p2:acme/widget").await.is_none());
    }

    #[tokio::test]
    async fn test_unparseable_value_is_purged() {
        let kv = Arc::new(KvStore::new());
        let cache = MetadataCache::new(kv.clone());

        kv.put("root", "{truncated".to_string(), None).await;

        assert!(cache.get_document("root").await.is_none());
        assert!(kv.get("root").await.is_none());
    }

    #[tokio::test]
    async fn test_scalar_number_is_rejected() {
        let kv = Arc::new(KvStore::new());
        let cache = MetadataCache::new(kv.clone());

        kv.put("root", "42".to_string(), None).await;
        assert!(cache.get_document("root").await.is_none());
    }

    #[tokio::test]
    async fn test_array_shape_is_accepted() {
        let cache = cache();
        let doc = json!([1, 2, 3]);

        cache.put_document("k", &doc, "ts").await;
        assert_eq!(cache.get_document("k").await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_invalidate_package() {
        let cache = cache();
        let doc = json!({"x": 1});

        cache
            .put_document(&provider_key("acme", "widget", false), &doc, "ts")
            .await;
        cache
            .put_document(&provider_key("acme", "widget", true), &doc, "ts")
            .await;
        cache.put_document(ROOT_INDEX_KEY, &doc, "ts").await;

        cache.invalidate_package("acme", "widget").await;

        assert!(cache
            .get_document(&provider_key("acme", "widget", false))
            .await
            .is_none());
        assert!(cache
            .get_document(&provider_key("acme", "widget", true))
            .await
            .is_none());
        assert!(cache.get_document(ROOT_INDEX_KEY).await.is_none());
    }
}
