// src/kv.rs

//! Shared key/value store with per-entry TTL
//!
//! Stands in for the external key-value service: cache entries and
//! rate-limit counters live here. Writes are last-write-wins and
//! counters are best-effort under concurrent bursts; there is no
//! cross-key transaction.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    /// None = no expiry
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process shared store exposing get / put-with-TTL / delete
#[derive(Debug, Default)]
pub struct KvStore {
    entries: RwLock<HashMap<String, KvEntry>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value; expired entries read as absent
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Put a value with an optional TTL
    pub async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            KvEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    /// Delete a key; deleting a missing key is a no-op
    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Increment a numeric counter, creating it with the given TTL
    ///
    /// The TTL is set only when the counter is created, so an hourly
    /// window expires as a whole. Read-modify-write without a lock on
    /// the key itself; small overshoot under concurrency is accepted.
    pub async fn increment(&self, key: &str, ttl: Option<Duration>) -> i64 {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                let current: i64 = entry.value.parse().unwrap_or(0);
                let next = current + 1;
                entry.value = next.to_string();
                next
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    KvEntry {
                        value: "1".to_string(),
                        expires_at: ttl.map(|d| Instant::now() + d),
                    },
                );
                1
            }
        }
    }

    /// Drop expired entries (call periodically)
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired());
    }
}
