//! Escalation to a human: idempotent ticket mint plus the handover turn.

use chrono::Utc;
use serde_json::json;

use tb_domain::conversation::{ConversationRecord, Status, SystemEventName, TicketRef};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::ticket::{EscalationReason, Ticket};
use tb_domain::Result;

use tb_store::build_contact_url;

use crate::state::AppState;

use super::classify::clip;
use super::{texts, transition, TurnInput, TurnOutput};

/// Hand the conversation over to a human.
///
/// One ticket per conversation: a repeat trigger returns the existing
/// ticket with a polite reminder instead of minting a second one.
pub fn escalate(
    state: &AppState,
    record: &mut ConversationRecord,
    reason: EscalationReason,
) -> Result<TurnOutput> {
    let lang = record.language;

    // Pre-ID conversations can't carry a ticket; point at the channel
    // directly and close.
    let Some(id) = record.conversation_id.clone() else {
        let url = format!(
            "{}{}",
            state.config.escalation.contact_url_base, state.config.escalation.contact_number
        );
        transition(record, Stage::Ended, "escalated_without_id");
        record.status = Status::Closed;
        return Ok(TurnOutput::ended(texts::escalated(lang, &url)));
    };

    if record.status == Status::Escalated {
        if let Some(existing) = state.tickets.load(&id)? {
            return Ok(existing_ticket_reply(record, existing.contact_url));
        }
    }

    let problem = record
        .context
        .problem
        .as_deref()
        .map(|p| one_line(p, 120))
        .unwrap_or_else(|| "consulta técnica".to_string());
    let contact_url = build_contact_url(
        &state.config.escalation,
        &record.user.masked(),
        &id,
        &problem,
    );

    let ticket = Ticket {
        conversation_id: id.clone(),
        created_at: Utc::now(),
        user: record.user.clone(),
        problem,
        reason,
        transcript_pointer: format!(
            "{}/historial/{}",
            state.config.escalation.public_base_url,
            id.as_str()
        ),
        contact_url: contact_url.clone(),
    };
    let ticket = state.tickets.create_if_absent(ticket)?;

    record.status = Status::Escalated;
    record.push_system(
        SystemEventName::Escalated,
        json!({ "reason": reason.as_str(), "contact_url": ticket.contact_url }),
    );

    let mut reply = String::new();
    if reason == EscalationReason::RiskDetected {
        reply.push_str(texts::risk_escalated_preamble(lang));
        reply.push_str("\n\n");
    }
    reply.push_str(&texts::escalated(lang, &ticket.contact_url));

    Ok(TurnOutput {
        reply,
        buttons: close_button(record),
        end: false,
        ticket: Some(TicketRef {
            conversation_id: id,
            contact_url: ticket.contact_url,
        }),
    })
}

/// Turns arriving after the handover: only the close button advances the
/// conversation; anything else repeats the contact link.
pub fn after_escalation(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;

    if input.input.button() == Some(ButtonToken::Close) {
        transition(record, Stage::Ended, "closed_after_escalation");
        return Ok(TurnOutput::ended(texts::closed(lang)));
    }

    let contact_url = record
        .conversation_id
        .as_ref()
        .and_then(|id| state.tickets.load(id).ok().flatten())
        .map(|t| t.contact_url)
        .unwrap_or_else(|| {
            format!(
                "{}{}",
                state.config.escalation.contact_url_base, state.config.escalation.contact_number
            )
        });
    Ok(existing_ticket_reply(record, contact_url))
}

fn existing_ticket_reply(record: &ConversationRecord, contact_url: String) -> TurnOutput {
    let lang = record.language;
    TurnOutput {
        reply: texts::already_escalated(lang, &contact_url),
        buttons: close_button(record),
        end: false,
        ticket: record.conversation_id.clone().map(|id| TicketRef {
            conversation_id: id,
            contact_url,
        }),
    }
}

/// The final close button every handover and post-handover turn offers.
///
/// Built directly rather than through the stage table: the record's stage
/// is frozen wherever escalation happened, and the escalated status
/// narrows the contract to exactly this token (`Stage::allowed_for`), even
/// on stages whose own allow-list never carries `BTN_CLOSE`.
fn close_button(record: &ConversationRecord) -> Vec<tb_domain::conversation::Button> {
    vec![tb_domain::conversation::Button {
        token: ButtonToken::Close,
        label: texts::button_label(ButtonToken::Close, record.language).to_string(),
        order: 1,
    }]
}

/// Collapse a free-text problem description to a single line.
fn one_line(text: &str, max_chars: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    clip(&joined, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_collapses_whitespace() {
        assert_eq!(
            one_line("no tengo\ninternet   desde ayer", 120),
            "no tengo internet desde ayer"
        );
        assert_eq!(one_line(&"x".repeat(500), 10).chars().count(), 10);
    }
}
