//! Admin authentication middleware.
//!
//! `ADMIN_TOKEN` is read once at startup; only its SHA-256 digest lives in
//! `AppState`. Requests to `/trace/:id` and `/historial/:id` must carry
//! `Authorization: Bearer <token>`; comparison is constant-time over the
//! digests so neither token length nor content leaks.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.admin_token_hash else {
        // No token configured: admin surface stays dark.
        return ApiError::unauthorized("-").into_response();
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return ApiError::unauthorized("-").into_response();
    }

    next.run(req).await
}
