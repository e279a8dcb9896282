//! `GET /resume/:id` — re-open a conversation by its six-character code.
//!
//! Suspends whatever stage was active into `CONTEXT_RESUME` and answers
//! with a summary plus resume/close buttons, so the next `/chat` turn can
//! pick the thread back up.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use tb_domain::conversation::{ChatReply, ConversationId, Status};
use tb_domain::stage::Stage;

use crate::api::error::ApiError;
use crate::flow::{self, modes, transition};
use crate::state::AppState;

pub async fn resume(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let ip = addr.ip().to_string();
    if !state.limits.allow(
        &format!("chat:{ip}"),
        state.config.server.limits.chat_per_min_per_ip,
    ) {
        return ApiError::rate_limited(&request_id).into_response();
    }

    if !ConversationId::is_valid(&id) {
        return ApiError::validation("invalid conversation id", &request_id).into_response();
    }

    let wait = Duration::from_millis(state.config.server.limits.lock_wait_ms);
    let _permit = match state.locks.acquire(&id, wait).await {
        Ok(p) => p,
        Err(_) => {
            let err = tb_domain::Error::LockBusy(id);
            return ApiError::from_domain(&err, &request_id).into_response();
        }
    };

    let mut record = match state.repo.load(&id) {
        Ok(Some(rec)) => rec,
        Ok(None) => return ApiError::not_found("unknown conversation", &request_id).into_response(),
        Err(e) => return ApiError::from_domain(&e, &request_id).into_response(),
    };

    let out = if record.status == Status::Open && record.stage != Stage::Ended {
        if record.stage != Stage::ContextResume {
            record.context.suspended_stage = Some(record.stage);
            transition(&mut record, Stage::ContextResume, "resume_endpoint");
        }
        let out = modes::resume_summary(&record);
        record.push_bot_buttons(out.reply.clone(), out.buttons.clone());
        if let Err(e) = state.repo.save(&record) {
            return ApiError::from_domain(&e, &request_id).into_response();
        }
        out
    } else if record.status == Status::Escalated {
        let contact_url = record
            .conversation_id
            .as_ref()
            .and_then(|cid| state.tickets.load(cid).ok().flatten())
            .map(|t| t.contact_url)
            .unwrap_or_default();
        flow::TurnOutput::text(flow::texts::already_escalated(record.language, &contact_url))
    } else {
        flow::TurnOutput::ended(flow::texts::conversation_over(record.language))
    };

    Json(ChatReply {
        ok: true,
        conversation_id: record.conversation_id.clone(),
        session_id: Some(record.session_id.clone()),
        stage: record.stage,
        reply: out.reply,
        buttons: out.buttons,
        end: out.end,
        ticket: None,
        request_id,
    })
    .into_response()
}
