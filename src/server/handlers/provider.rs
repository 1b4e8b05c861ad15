// src/server/handlers/provider.rs

//! Per-package provider document endpoint
//!
//! `/p2/{vendor}/{package}.json` serves the stable channel and
//! `/p2/{vendor}/{package}~dev.json` the dev channel. The second path
//! segment carries the variant suffix, so it is parsed here rather
//! than in the route table.

use crate::error::Error;
use crate::server::handlers::error_response;
use crate::server::{auth, documents, AuthMode, ServerState};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// GET /p2/:vendor/:package
pub async fn provider_document(
    State(state): State<Arc<ServerState>>,
    Path((vendor, package_file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = auth::authenticate(
        &state.config.db_path,
        &state.rate_limiter,
        &headers,
        AuthMode::Document,
    )
    .await
    {
        return error_response(e);
    }

    let Some((package, dev)) = parse_package_segment(&package_file) else {
        return error_response(Error::NotFound(format!(
            "no provider document at p2/{vendor}/{package_file}"
        )));
    };

    match documents::provider_document(&state, &vendor, package, dev).await {
        Ok(document) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, "public, max-age=60"),
            ],
            document.to_string(),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Split "name.json" / "name~dev.json" into (name, dev flag)
fn parse_package_segment(segment: &str) -> Option<(&str, bool)> {
    let stem = segment.strip_suffix(".json")?;
    match stem.strip_suffix("~dev") {
        Some(name) if !name.is_empty() => Some((name, true)),
        Some(_) => None,
        None if !stem.is_empty() => Some((stem, false)),
        None => None,
    }
}
