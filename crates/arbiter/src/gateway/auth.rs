//! Shared-secret authentication

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::gateway::{ApiError, AppState};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare two byte strings without an early exit on the first difference
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref expected) = state.api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| value.as_bytes());

    match provided {
        Some(key) if constant_time_eq(key, expected.as_bytes()) => next.run(request).await,
        Some(_) => {
            debug!("rejected request with invalid api key");
            unauthorized("Invalid API key")
        }
        None => unauthorized("Missing API key"),
    }
}

fn unauthorized(message: &str) -> Response {
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message).into_response()
}
