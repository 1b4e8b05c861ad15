// src/server/handlers/mod.rs

//! Endpoint handlers and shared response assembly

pub mod dist;
pub mod index;
pub mod provider;

use crate::error::Error;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

/// Map a core error onto a structured HTTP response
///
/// Every response body is JSON with a correlation id, never a raw
/// error trace. Internal faults are logged with the id and surfaced
/// with a generic message.
pub fn error_response(err: Error) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let (status, message, retry_after) = match &err {
        Error::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
        Error::RateLimitExceeded { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded".to_string(),
            Some(*retry_after_secs),
        ),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
        Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        Error::UpstreamFetch(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), None),
        other => {
            error!(correlation_id = %correlation_id, "internal error: {other}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                None,
            )
        }
    };

    let body = Json(json!({
        "error": message,
        "correlation_id": correlation_id,
    }));

    match retry_after {
        Some(secs) => (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response(),
        None => (status, body).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_bodies_are_structured() {
        let response = error_response(Error::NotFound("no such package".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "no such package");
        assert!(body["correlation_id"].as_str().unwrap().len() > 10);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_hint() {
        let response = error_response(Error::RateLimitExceeded {
            retry_after_secs: 120,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "120");
    }

    #[tokio::test]
    async fn test_internal_faults_are_masked() {
        let response = error_response(Error::Storage("disk on fire at /secret/path".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal error");
    }
}
