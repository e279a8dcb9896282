//! The conversation FSM runtime.
//!
//! [`dispatch`] runs exactly one turn: it validates the current stage,
//! handles intents that transcend the state machine (explicit technician
//! requests, risk keywords, free-form questions), then hands the record to
//! the stage handler. Handlers mutate the record, move stages through
//! [`transition`] (which clamps illegal moves), and return the reply plus
//! freshly built buttons — never the previous turn's.

pub mod buttons;
pub mod classify;
pub mod connectivity;
pub mod escalate;
pub mod modes;
pub mod onboarding;
pub mod step;
pub mod texts;

use serde_json::json;

use tb_domain::conversation::{Button, ConversationRecord, Status, SystemEventName, TicketRef};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::trace::TraceEvent;
use tb_domain::Result;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn input / output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum UserInput {
    Text(String),
    Button { value: ButtonToken, label: String },
}

impl UserInput {
    pub fn text(&self) -> Option<&str> {
        match self {
            UserInput::Text(t) => Some(t),
            UserInput::Button { .. } => None,
        }
    }

    pub fn button(&self) -> Option<ButtonToken> {
        match self {
            UserInput::Button { value, .. } => Some(*value),
            UserInput::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub request_id: String,
    pub input: UserInput,
    pub image_base64: Option<String>,
}

/// What a handler hands back for the bot side of the turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub reply: String,
    pub buttons: Vec<Button>,
    pub end: bool,
    pub ticket: Option<TicketRef>,
}

impl TurnOutput {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            buttons: Vec::new(),
            end: false,
            ticket: None,
        }
    }

    pub fn with_buttons(reply: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            reply: reply.into(),
            buttons,
            end: false,
            ticket: None,
        }
    }

    pub fn ended(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            buttons: Vec::new(),
            end: true,
            ticket: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage transitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Move the record to `to`, emitting `STAGE_CHANGED` — or clamp the move
/// with a `TRANSITION_CLAMPED` warning event when the state map forbids it.
pub fn transition(record: &mut ConversationRecord, to: Stage, reason: &str) {
    let from = record.stage;
    if from == to {
        return;
    }
    if !Stage::may_transition(from, to, record.status) {
        tracing::warn!(
            from = from.as_str(),
            to = to.as_str(),
            reason,
            "illegal stage transition clamped"
        );
        record.push_system(
            SystemEventName::TransitionClamped,
            json!({ "from": from.as_str(), "to": to.as_str(), "reason": reason }),
        );
        return;
    }
    record.push_system(
        SystemEventName::StageChanged,
        json!({ "from": from.as_str(), "to": to.as_str(), "reason": reason }),
    );
    record.stage = to;
    TraceEvent::StageChanged {
        conversation_id: record
            .conversation_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| record.session_id.clone()),
        from: from.as_str().into(),
        to: to.as_str().into(),
        reason: reason.into(),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn dispatch(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;

    // A record written by a future schema can't be trusted: cold-start it.
    if record.legacy_incompatible {
        record.legacy_incompatible = false;
        record.context = Default::default();
        record.push_system(
            SystemEventName::StageChanged,
            json!({ "from": record.stage.as_str(), "to": Stage::AskConsent.as_str(), "reason": "stage_invalid" }),
        );
        record.stage = Stage::AskConsent;
        return Ok(TurnOutput::with_buttons(
            texts::greeting(lang),
            buttons::defaults(Stage::AskConsent, lang),
        ));
    }

    // Terminal statuses only report.
    match record.status {
        Status::Closed => return Ok(TurnOutput::ended(texts::conversation_over(lang))),
        Status::Escalated => return escalate::after_escalation(state, record, input),
        Status::Open => {}
    }
    if record.stage == Stage::Ended {
        return Ok(TurnOutput::ended(texts::conversation_over(lang)));
    }

    // ── Intents that transcend the FSM ──────────────────────────────
    if let Some(text) = input.input.text() {
        if detect_risk_keywords(text) {
            record.context.risk_keywords_seen = true;
        }
        if is_explicit_tech_request(text)
            && !matches!(record.stage, Stage::AskConsent | Stage::AskLanguage)
        {
            return escalate::escalate(
                state,
                record,
                tb_domain::ticket::EscalationReason::UserRequested,
            );
        }
        if should_suspend_for_question(record.stage, text) {
            return modes::suspend_for_question(state, record, text).await;
        }
    }
    if input.input.button() == Some(ButtonToken::ConnectTech) {
        return escalate::escalate(
            state,
            record,
            tb_domain::ticket::EscalationReason::UserRequested,
        );
    }
    if input.input.button() == Some(ButtonToken::Close) {
        transition(record, Stage::Ended, "user_closed");
        record.status = Status::Closed;
        return Ok(TurnOutput::ended(texts::closed(lang)));
    }

    // ── Stage handlers ──────────────────────────────────────────────
    match record.stage {
        Stage::AskConsent => onboarding::consent(record, input),
        Stage::AskLanguage => onboarding::language(state, record, input).await,
        Stage::AskName => onboarding::name(record, input),
        Stage::AskUserLevel => onboarding::user_level(record, input),
        Stage::AskDeviceCategory => onboarding::device_category(record, input),
        Stage::AskDeviceTypeMain => onboarding::device_type_main(record, input),
        Stage::AskDeviceTypeExternal => onboarding::device_type_external(record, input),
        Stage::AskProblem | Stage::AskProblemClarification => {
            classify::handle(state, record, input).await
        }
        Stage::GuidedStory => classify::guided_story(state, record, input).await,
        Stage::DiagnosticStep | Stage::InstallationStep => step::handle(state, record, input).await,
        Stage::ConnectivityFlow => connectivity::handle(state, record, input),
        Stage::RiskConfirmation => modes::risk_confirmation(state, record, input).await,
        Stage::EmotionalRelease => modes::emotional_release(state, record, input).await,
        Stage::ContextResume => modes::context_resume(record, input),
        Stage::AskInteractionMode | Stage::AskLearningDepth | Stage::AskExecutorRole => {
            modes::preference_probe(state, record, input).await
        }
        Stage::AskFeedback => modes::feedback(record, input),
        Stage::Ended => Ok(TurnOutput::ended(texts::conversation_over(lang))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcendent intent detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lowercase and fold the accents the help-desk languages use, so keyword
/// checks tolerate both "técnico" and the common unaccented typing.
fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}

/// "I want a technician", with normalized typos. A verb of asking plus a
/// human-ish noun keeps "el técnico me dijo..." from triggering.
fn is_explicit_tech_request(text: &str) -> bool {
    let norm = normalize(text);
    const VERBS: &[&str] = &[
        "quiero", "necesito", "pasame", "hablar", "llamar", "llamen", "busco", "dame", "atienda",
        "want", "need", "talk", "speak", "call", "give me",
    ];
    const NOUNS: &[&str] = &[
        "tecnico", "tenico", "tecnco", "teknico", "humano", "persona", "alguien real",
        "technician", "human", "agent", "someone real",
    ];
    VERBS.iter().any(|v| norm.contains(v)) && NOUNS.iter().any(|n| norm.contains(n))
}

/// High-risk physical conditions. Escalation additionally requires the
/// classifier's high-risk flag; the keyword alone only arms the check.
pub fn detect_risk_keywords(text: &str) -> bool {
    let norm = normalize(text);
    const KEYWORDS: &[&str] = &[
        "olor a quemado",
        "quemado",
        "quemada",
        "humo",
        "chispa",
        "se prendio fuego",
        "liquido",
        "se mojo",
        "derrame",
        "burning smell",
        "smoke",
        "spark",
        "caught fire",
        "spilled",
        "liquid",
    ];
    KEYWORDS.iter().any(|k| norm.contains(k))
}

/// A question typed where the flow expects a button press suspends the
/// stage; LLM-governed stages answer questions natively.
fn should_suspend_for_question(stage: Stage, text: &str) -> bool {
    matches!(stage, Stage::ConnectivityFlow | Stage::RiskConfirmation) && text.contains('?')
}

/// Venting detection for the one-shot emotional-release beat.
pub fn detect_frustration(text: &str) -> bool {
    let norm = normalize(text);
    const KEYWORDS: &[&str] = &[
        "harto", "harta", "podrido", "podrida", "no doy mas", "no aguanto", "una verguenza",
        "estoy cansado de", "estoy cansada de", "furioso", "furiosa", "desesperado",
        "desesperada", "fed up", "sick of", "had enough", "so frustrated",
    ];
    KEYWORDS.iter().any(|k| norm.contains(k))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rate-limit / lock key for a record: the conversation ID once assigned,
/// the session ID before that.
pub fn record_key(record: &ConversationRecord) -> String {
    record
        .conversation_id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| record.session_id.clone())
}

/// Re-ask whatever the current stage was asking, with buttons rebuilt from
/// scratch. Used when a suspended stage is resumed.
pub fn reprompt(record: &ConversationRecord) -> TurnOutput {
    let lang = record.language;
    match record.stage {
        Stage::AskConsent => {
            TurnOutput::with_buttons(texts::greeting(lang), buttons::defaults(Stage::AskConsent, lang))
        }
        Stage::AskLanguage => TurnOutput::with_buttons(
            texts::ask_language(lang),
            buttons::defaults(Stage::AskLanguage, lang),
        ),
        Stage::AskName => TurnOutput::text(texts::ask_name_again(lang)),
        Stage::AskUserLevel => TurnOutput::with_buttons(
            texts::use_buttons(lang),
            buttons::defaults(Stage::AskUserLevel, lang),
        ),
        Stage::AskDeviceCategory => TurnOutput::with_buttons(
            texts::ask_device_category(lang),
            buttons::defaults(Stage::AskDeviceCategory, lang),
        ),
        Stage::AskDeviceTypeMain => TurnOutput::with_buttons(
            texts::ask_device_type_main(lang),
            buttons::defaults(Stage::AskDeviceTypeMain, lang),
        ),
        Stage::AskDeviceTypeExternal => TurnOutput::text(texts::ask_device_type_external(lang)),
        Stage::AskProblem | Stage::AskProblemClarification => {
            TurnOutput::text(texts::ask_problem(lang))
        }
        Stage::GuidedStory => {
            let index = record.context.story_notes.len().min(2);
            TurnOutput::text(texts::story_question(lang, index))
        }
        Stage::DiagnosticStep | Stage::InstallationStep => {
            let reply = record
                .context
                .recent_steps
                .last()
                .cloned()
                .unwrap_or_else(|| texts::fallback_step(record.stage, lang).to_string());
            TurnOutput::with_buttons(reply, buttons::defaults(record.stage, lang))
        }
        Stage::ConnectivityFlow => connectivity::reprompt(record),
        Stage::RiskConfirmation => TurnOutput::with_buttons(
            texts::risk_summary(lang),
            buttons::defaults(Stage::RiskConfirmation, lang),
        ),
        Stage::EmotionalRelease => TurnOutput::with_buttons(
            texts::emotional_release(lang),
            buttons::defaults(Stage::EmotionalRelease, lang),
        ),
        Stage::ContextResume => modes::resume_summary(record),
        Stage::AskInteractionMode | Stage::AskLearningDepth | Stage::AskExecutorRole => {
            modes::probe_question(record, record.stage)
        }
        Stage::AskFeedback => TurnOutput::with_buttons(
            texts::solved_reply(lang),
            buttons::defaults(Stage::AskFeedback, lang),
        ),
        Stage::Ended => TurnOutput::ended(texts::conversation_over(lang)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_request_detection() {
        assert!(is_explicit_tech_request("quiero un técnico por favor"));
        assert!(is_explicit_tech_request("necesito hablar con un tenico"));
        assert!(is_explicit_tech_request("I want to talk to a human"));
        assert!(!is_explicit_tech_request("el tecnico me dijo que era la fuente"));
        assert!(!is_explicit_tech_request("no tengo internet"));
    }

    #[test]
    fn risk_keyword_detection() {
        assert!(detect_risk_keywords("sale olor a quemado de la fuente"));
        assert!(detect_risk_keywords("se me derramó un líquido encima"));
        assert!(detect_risk_keywords("I can smell smoke from the PSU"));
        assert!(!detect_risk_keywords("la pantalla está negra"));
    }

    #[test]
    fn question_suspension_only_at_button_stages() {
        assert!(should_suspend_for_question(
            Stage::ConnectivityFlow,
            "¿qué es el SSID?"
        ));
        assert!(!should_suspend_for_question(
            Stage::DiagnosticStep,
            "¿qué es el SSID?"
        ));
        assert!(!should_suspend_for_question(Stage::ConnectivityFlow, "wifi"));
    }
}
