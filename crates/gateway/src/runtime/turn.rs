//! Turn orchestration: one user event in, one bot reply out, with the
//! idempotent-replay check and the audit trail around the FSM dispatch.

use serde_json::json;

use tb_domain::conversation::{ChatReply, ConversationRecord, SystemEventName, TranscriptEvent};
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

use crate::flow::{self, TurnInput, UserInput};
use crate::state::AppState;

/// Run one turn against a loaded record. The caller holds the
/// per-conversation lock and persists the record afterwards; this function
/// only mutates it.
pub async fn run_turn(
    state: &AppState,
    record: &mut ConversationRecord,
    input: TurnInput,
) -> Result<ChatReply> {
    let started = std::time::Instant::now();

    // Duplicate request: replay the stored response byte-for-byte, with
    // zero new transcript events.
    if let Some(prev) = record.find_processed(&input.request_id) {
        TraceEvent::DuplicateRequestReplayed {
            conversation_id: flow::record_key(record),
            request_id: input.request_id.clone(),
        }
        .emit();
        return Ok(prev.clone());
    }

    match &input.input {
        UserInput::Text(t) => record.push_user_text(t.clone()),
        UserInput::Button { value, label } => record.push_user_button(label.clone(), *value),
    }

    if let Some(payload) = &input.image_base64 {
        let Some(id) = record.conversation_id.clone() else {
            return Err(Error::Validation(
                "image uploads require an assigned conversation id".into(),
            ));
        };
        let stored = state.images.store(&id, payload)?;
        record.push_system(
            SystemEventName::ImageAttached,
            json!({ "url": stored.url_path, "bytes": stored.bytes, "ext": stored.ext }),
        );
    }

    let events_before = record.transcript.len();
    let output = flow::dispatch(state, record, &input).await?;
    let llm_calls = count_llm_calls(&record.transcript[events_before..]);

    if output.buttons.is_empty() {
        record.push_bot_text(output.reply.clone());
    } else {
        record.push_bot_buttons(output.reply.clone(), output.buttons.clone());
    }

    let reply = ChatReply {
        ok: true,
        conversation_id: record.conversation_id.clone(),
        session_id: Some(record.session_id.clone()),
        stage: record.stage,
        reply: output.reply,
        buttons: output.buttons,
        end: output.end,
        ticket: output.ticket,
        request_id: input.request_id.clone(),
    };
    record.record_processed(&input.request_id, reply.clone());

    TraceEvent::TurnCompleted {
        conversation_id: flow::record_key(record),
        stage: record.stage.as_str().into(),
        duration_ms: started.elapsed().as_millis() as u64,
        llm_calls,
    }
    .emit();

    Ok(reply)
}

fn count_llm_calls(events: &[TranscriptEvent]) -> u32 {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                TranscriptEvent::System {
                    event: tb_domain::conversation::SystemEvent::Event {
                        name: SystemEventName::IaCallStart,
                        ..
                    },
                    ..
                }
            )
        })
        .count() as u32
}
