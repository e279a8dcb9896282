//! `POST /chat` — advance one turn (text or button press).

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use tb_domain::conversation::{ConversationId, ConversationRecord};
use tb_domain::stage::{ButtonToken, Stage, StageKind};

use crate::api::error::ApiError;
use crate::flow::{self, TurnInput, UserInput};
use crate::runtime::run_turn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Set once the ID was assigned at language selection.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Opaque pre-ID continuity key from `/greeting`.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Client-supplied idempotency key.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// `"button"` when the user pressed one.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let request_id = body
        .request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let ip = addr.ip().to_string();
    if !state.limits.allow(
        &format!("chat:{ip}"),
        state.config.server.limits.chat_per_min_per_ip,
    ) {
        return ApiError::rate_limited(&request_id).into_response();
    }

    // ── Resolve the record key ──────────────────────────────────────
    let (lock_key, by_id) = match (&body.conversation_id, &body.session_id) {
        (Some(id), _) => {
            if !ConversationId::is_valid(id) {
                return ApiError::validation("invalid conversation_id", &request_id)
                    .into_response();
            }
            (id.clone(), true)
        }
        (None, Some(sid)) => (format!("sess:{sid}"), false),
        (None, None) => {
            return ApiError::validation(
                "conversation_id or session_id is required",
                &request_id,
            )
            .into_response()
        }
    };

    // ── Per-conversation mutex, bounded wait ────────────────────────
    let wait = Duration::from_millis(state.config.server.limits.lock_wait_ms);
    let _permit = match state.locks.acquire(&lock_key, wait).await {
        Ok(p) => p,
        Err(_) => {
            let err = tb_domain::Error::LockBusy(lock_key);
            return ApiError::from_domain(&err, &request_id).into_response();
        }
    };

    // ── Load ────────────────────────────────────────────────────────
    let mut record: ConversationRecord = if by_id {
        match state.repo.load(body.conversation_id.as_deref().unwrap_or_default()) {
            Ok(Some(rec)) => rec,
            Ok(None) => {
                return ApiError::not_found("unknown conversation", &request_id).into_response()
            }
            Err(e) => return ApiError::from_domain(&e, &request_id).into_response(),
        }
    } else {
        match state
            .repo
            .load_session(body.session_id.as_deref().unwrap_or_default())
        {
            Some(rec) => rec,
            None => {
                return ApiError::not_found(
                    "unknown or expired session, call /greeting",
                    &request_id,
                )
                .into_response()
            }
        }
    };

    // ── Parse the user input ────────────────────────────────────────
    let input = match parse_input(&body, &record, &request_id) {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    // ── LLM budget per conversation ─────────────────────────────────
    let stage = record.stage;
    if (stage.kind() == StageKind::LlmGoverned || stage == Stage::GuidedStory)
        && !state.limits.allow(
            &format!("llm:{}", flow::record_key(&record)),
            state.config.llm.calls_per_min_per_conversation,
        )
    {
        return ApiError::rate_limited(&request_id).into_response();
    }

    // ── Run the turn ────────────────────────────────────────────────
    let turn = TurnInput {
        request_id: request_id.clone(),
        input,
        image_base64: body.image_base64.clone(),
    };
    match run_turn(&state, &mut record, turn).await {
        Ok(reply) => {
            if let Err(e) = persist(&state, &record) {
                return ApiError::from_domain(&e, &request_id).into_response();
            }
            Json(reply).into_response()
        }
        Err(e) => {
            // The failed turn's output is not persisted, but the trace of
            // the attempt is (input event, validation-fail markers).
            if record.conversation_id.is_some() {
                if let Err(save_err) = state.repo.save(&record) {
                    tracing::warn!(error = %save_err, "failed to persist error trace");
                }
            } else {
                state.repo.save_session(&record);
            }
            ApiError::from_domain(&e, &request_id).into_response()
        }
    }
}

fn persist(state: &AppState, record: &ConversationRecord) -> tb_domain::Result<()> {
    if record.conversation_id.is_some() {
        state.repo.save(record)
    } else {
        state.repo.save_session(record);
        Ok(())
    }
}

/// Text XOR button, and a pressed button must be one the conversation
/// permits right now (the stage table for open conversations, the close
/// button alone for escalated ones).
fn parse_input(
    body: &ChatRequest,
    record: &ConversationRecord,
    request_id: &str,
) -> Result<UserInput, ApiError> {
    if body.action.as_deref() == Some("button") {
        let Some(value) = &body.value else {
            return Err(ApiError::validation("button action without value", request_id));
        };
        let Some(token) = ButtonToken::parse(value) else {
            return Err(ApiError::validation("unknown button token", request_id));
        };
        if !record.stage.allowed_for(record.status).contains(&token) {
            return Err(ApiError::validation(
                "button not permitted in the current stage",
                request_id,
            ));
        }
        return Ok(UserInput::Button {
            value: token,
            label: body.label.clone().unwrap_or_else(|| value.clone()),
        });
    }

    match &body.text {
        Some(text) if !text.trim().is_empty() => {
            if text.chars().count() > 4_000 {
                return Err(ApiError::validation("text too long", request_id));
            }
            Ok(UserInput::Text(text.trim().to_string()))
        }
        _ => Err(ApiError::validation(
            "either text or a button action is required",
            request_id,
        )),
    }
}
