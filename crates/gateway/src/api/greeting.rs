//! `POST /greeting` — create (or re-serve) the opening turn.
//!
//! No conversation ID exists yet: the record lives only in the session
//! cache under a fresh opaque `session_id` until the user picks a language.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use tb_domain::conversation::{ChatReply, ConversationRecord};
use tb_domain::stage::Stage;
use tb_domain::trace::TraceEvent;

use crate::api::error::ApiError;
use crate::flow::{self, buttons, texts};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GreetingRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    /// When present and known, the existing opening state is re-served
    /// instead of minting a new session.
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn greeting(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Option<Json<GreetingRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let request_id = req
        .request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let ip = addr.ip().to_string();
    if !state.limits.allow(
        &format!("greet:{ip}"),
        state.config.server.limits.greeting_per_min_per_ip,
    ) {
        return ApiError::rate_limited(&request_id).into_response();
    }

    // Return-an-existing-opening path.
    if let Some(sid) = &req.session_id {
        if let Some(record) = state.repo.load_session(sid) {
            let out = flow::reprompt(&record);
            let reply = ChatReply {
                ok: true,
                conversation_id: record.conversation_id.clone(),
                session_id: Some(record.session_id.clone()),
                stage: record.stage,
                reply: out.reply,
                buttons: out.buttons,
                end: out.end,
                ticket: None,
                request_id,
            };
            return Json(reply).into_response();
        }
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let mut record = ConversationRecord::new_session(session_id.clone());
    TraceEvent::ConversationCreated {
        session_id: session_id.clone(),
    }
    .emit();

    let lang = record.language;
    let opening = texts::greeting(lang);
    let consent_buttons = buttons::defaults(Stage::AskConsent, lang);
    record.push_bot_buttons(opening, consent_buttons.clone());

    let reply = ChatReply {
        ok: true,
        conversation_id: None,
        session_id: Some(session_id),
        stage: record.stage,
        reply: opening.to_string(),
        buttons: consent_buttons,
        end: false,
        ticket: None,
        request_id: request_id.clone(),
    };
    record.record_processed(&request_id, reply.clone());
    state.repo.save_session(&record);

    Json(reply).into_response()
}
