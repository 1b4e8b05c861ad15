// src/lib.rs

//! Canister - Composer repository proxy and mirror
//!
//! A private package repository server speaking the Composer v2 client
//! protocol, backed by configurable upstream sources.
//!
//! # Architecture
//!
//! - Database-first: all package/version/credential state in SQLite
//! - Provider documents computed from the database and cached with
//!   shape-validated, self-healing reads
//! - Multi-strategy sync: git-hosted (two-tier), protocol-native
//!   pass-through, flat archive index
//! - Pull-through artifact mirroring with deferred persistence

pub mod cache;
pub mod db;
mod error;
pub mod kv;
pub mod mirror;
pub mod server;
pub mod storage;
pub mod sync;
pub mod version;

pub use cache::MetadataCache;
pub use error::{Error, Result};
pub use kv::KvStore;
pub use mirror::{ArtifactLocator, ArtifactMirror};
pub use storage::ObjectStore;
pub use sync::{SyncEngine, SyncResult, SyncStrategy};
pub use version::{is_dev_version, VersionKey};
