//! `GET /images/:id/:file` — serve uploaded images back to the widget.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn serve_image(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((id, file)): Path<(String, String)>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let ip = addr.ip().to_string();
    if !state.limits.allow(
        &format!("chat:{ip}"),
        state.config.server.limits.chat_per_min_per_ip,
    ) {
        return ApiError::rate_limited(&request_id).into_response();
    }

    let path = match state.images.resolve(&id, &file) {
        Ok(p) => p,
        Err(e) => return ApiError::from_domain(&e, &request_id).into_response(),
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) => {
            return ApiError::from_domain(&tb_domain::Error::Io(e), &request_id).into_response()
        }
    };

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };

    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}
