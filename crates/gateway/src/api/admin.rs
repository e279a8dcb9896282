//! Admin exports, behind the bearer-token guard:
//! - `GET /trace/:id` — system events only (the forensic audit trail)
//! - `GET /historial/:id` — the full transcript with metadata

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use tb_domain::conversation::{ConversationId, TranscriptEvent};

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "status": "alive" }))
}

pub async fn trace(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let record = match load(&state, &id, &request_id) {
        Ok(rec) => rec,
        Err(e) => return e.into_response(),
    };

    let events: Vec<_> = record
        .transcript
        .iter()
        .filter(|e| matches!(e, TranscriptEvent::System { .. }))
        .collect();

    Json(serde_json::json!({
        "ok": true,
        "conversation_id": id,
        "status": record.status,
        "stage": record.stage,
        "flow_version": record.flow_version,
        "schema_version": record.schema_version,
        "events": events,
        "request_id": request_id,
    }))
    .into_response()
}

pub async fn historial(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let record = match load(&state, &id, &request_id) {
        Ok(rec) => rec,
        Err(e) => return e.into_response(),
    };

    Json(serde_json::json!({
        "ok": true,
        "conversation_id": id,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "language": record.language,
        "status": record.status,
        "stage": record.stage,
        "feedback": record.feedback,
        "user": record.user,
        "user_level": record.user_level,
        "context": record.context,
        "modes": record.modes,
        "transcript": record.transcript,
        "request_id": request_id,
    }))
    .into_response()
}

fn load(
    state: &AppState,
    id: &str,
    request_id: &str,
) -> Result<tb_domain::conversation::ConversationRecord, ApiError> {
    if !ConversationId::is_valid(id) {
        return Err(ApiError::validation("invalid conversation id", request_id));
    }
    match state.repo.load(id) {
        Ok(Some(rec)) => Ok(rec),
        Ok(None) => Err(ApiError::not_found("unknown conversation", request_id)),
        Err(e) => Err(ApiError::from_domain(&e, request_id)),
    }
}
