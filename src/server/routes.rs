// src/server/routes.rs

//! Axum router configuration
//!
//! Artifact routes skip the compression layer (archives are already
//! compressed); document routes benefit from it.

use crate::server::handlers::{dist, index, provider};
use crate::server::ServerState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new();

    // All three artifact address forms share one four-segment route;
    // the handler dispatches on the first segment
    let dist_routes = Router::new()
        .route("/dist/:a/:b/:c/:d", get(dist::get_artifact))
        .with_state(state.clone());

    let document_routes = Router::new()
        .route("/health", get(health_check))
        .route("/packages.json", get(index::root_index))
        .route("/p2/:vendor/:package", get(provider::provider_document))
        .layer(compression)
        .with_state(state);

    Router::new()
        .merge(dist_routes)
        .merge(document_routes)
        .layer(cors)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
