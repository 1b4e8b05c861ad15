// src/server/mod.rs

//! Canister HTTP server
//!
//! Serves the Composer client protocol:
//! - root index and per-package provider documents, computed from the
//!   database and cached with self-healing shape validation
//! - artifact downloads through the pull-through mirror
//! - token/session authentication with per-token hourly rate limits
//!
//! A background task runs scheduled syncs and store cleanup.

pub mod auth;
mod documents;
mod handlers;
mod routes;

pub use auth::{AuthContext, AuthMode, RateLimiter};
pub use routes::create_router;

use crate::cache::MetadataCache;
use crate::kv::KvStore;
use crate::mirror::ArtifactMirror;
use crate::storage::ObjectStore;
use crate::sync::SyncEngine;
use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Path to the canister database
    pub db_path: PathBuf,
    /// Root directory for mirrored artifact blobs
    pub storage_dir: PathBuf,
    /// TTL for cached documents
    pub cache_ttl: Duration,
    /// Request timeout for upstream fetches
    pub upstream_timeout: Duration,
    /// Interval between scheduled sync passes (None = disabled)
    pub sync_poll_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            db_path: PathBuf::from("/var/lib/canister/canister.db"),
            storage_dir: PathBuf::from("/var/lib/canister/artifacts"),
            cache_ttl: Duration::from_secs(3600),
            upstream_timeout: Duration::from_secs(30),
            sync_poll_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Shared server state
///
/// Everything here is either read-only configuration or a
/// self-contained concurrent store; handlers never hold cross-request
/// locks.
pub struct ServerState {
    pub config: ServerConfig,
    pub kv: Arc<KvStore>,
    pub cache: MetadataCache,
    pub mirror: ArtifactMirror,
    pub sync_engine: SyncEngine,
    pub rate_limiter: RateLimiter,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let kv = Arc::new(KvStore::new());
        let cache = MetadataCache::with_ttl(kv.clone(), config.cache_ttl);

        let http_client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .user_agent(concat!("canister/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        let storage = Arc::new(ObjectStore::new(config.storage_dir.clone()));
        let mirror = ArtifactMirror::new(config.db_path.clone(), storage, http_client.clone());
        let sync_engine = SyncEngine::new(config.db_path.clone(), cache.clone(), http_client);
        let rate_limiter = RateLimiter::new(kv.clone());

        Self {
            config,
            kv,
            cache,
            mirror,
            sync_engine,
            rate_limiter,
        }
    }
}

/// Start the canister server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting canister server on {}", config.bind_addr);
    tracing::info!("Database: {:?}", config.db_path);
    tracing::info!("Artifact storage: {:?}", config.storage_dir);

    let state = Arc::new(ServerState::new(config.clone()));

    if let Some(interval) = config.sync_poll_interval {
        tracing::info!("Scheduled sync: every {}s", interval.as_secs());
        let sync_state = state.clone();
        tokio::spawn(async move {
            run_maintenance_loop(sync_state, interval).await;
        });
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Canister is ready to serve");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Background loop: scheduled syncs plus expired-entry cleanup
async fn run_maintenance_loop(state: Arc<ServerState>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        state.sync_engine.synchronize_due().await;
        state.kv.cleanup().await;
    }
}
