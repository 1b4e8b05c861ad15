// src/server/handlers/dist.rs

//! Artifact download endpoints
//!
//! All three address forms share one four-segment route under /dist
//! and differ only in how the target repository is located:
//! - `/dist/{repositoryId}/{vendor}/{package}/{version}` - direct id
//! - `/dist/m/{vendor}/{package}/{version}` - repository resolved
//!   from stored package data
//! - `/dist/{vendor}/{package}/{version}/{reference}` - lockfile form
//!   pinning an exact source reference
//!
//! Dispatch is on the first segment: the mirror marker, a numeric id,
//! or a vendor name.

use crate::mirror::{ArtifactLocator, ARCHIVE_CONTENT_TYPE};
use crate::server::handlers::error_response;
use crate::server::{auth, AuthMode, ServerState};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// GET /dist/:a/:b/:c/:d
pub async fn get_artifact(
    State(state): State<Arc<ServerState>>,
    Path((a, b, c, d)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    // Dual-mode: package-tool tokens and admin sessions both pass
    if let Err(e) = auth::authenticate(
        &state.config.db_path,
        &state.rate_limiter,
        &headers,
        AuthMode::Artifact,
    )
    .await
    {
        return error_response(e);
    }

    let (locator, vendor, package, version) = if a == "m" {
        (ArtifactLocator::Mirror, b, c, d)
    } else if let Ok(repository_id) = a.parse::<i64>() {
        (ArtifactLocator::Direct { repository_id }, b, c, d)
    } else {
        (ArtifactLocator::Lockfile { reference: d }, a, b, c)
    };

    match state
        .mirror
        .resolve(&locator, &vendor, &package, &version)
        .await
    {
        Ok(hit) => {
            let disposition = format!("attachment; filename=\"{}\"", hit.filename);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
                    (header::CONTENT_LENGTH, hit.bytes.len().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                    (
                        header::CACHE_CONTROL,
                        "public, max-age=3600".to_string(),
                    ),
                ],
                hit.bytes,
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}
