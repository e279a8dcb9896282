pub mod admin;
pub mod auth;
pub mod chat;
pub mod error;
pub mod greeting;
pub mod images;
pub mod resume;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (the widget surface) and **admin**
/// (gated behind the `ADMIN_TOKEN` bearer middleware). `/chat` carries the
/// large body cap for image payloads; everything else keeps the small one.
pub fn router(state: AppState) -> Router<AppState> {
    let limits = &state.config.server.limits;

    let chat_routes = Router::new()
        .route("/chat", post(chat::chat))
        .layer(DefaultBodyLimit::max(limits.chat_body_bytes));

    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/greeting", post(greeting::greeting))
        .route("/resume/:id", get(resume::resume))
        .route("/images/:id/:file", get(images::serve_image))
        .layer(DefaultBodyLimit::max(limits.default_body_bytes));

    let protected = Router::new()
        .route("/trace/:id", get(admin::trace))
        .route("/historial/:id", get(admin::historial))
        .layer(DefaultBodyLimit::max(limits.default_body_bytes))
        // Apply admin auth middleware to the export routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_admin_token,
        ));

    chat_routes
        .merge(public)
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
