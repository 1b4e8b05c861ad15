// src/server/handlers/index.rs

//! Root index endpoint

use crate::server::handlers::error_response;
use crate::server::{auth, documents, AuthMode, ServerState};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// GET /packages.json
///
/// The top-level descriptor a Composer client fetches first.
pub async fn root_index(
    State(state): State<Arc<ServerState>>,
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

    match documents::root_index(&state).await {
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
