//! Classifier handler: maps raw problem descriptions to intent, risk, and
//! the next stage, with the guided-story elicitation for low-confidence
//! inputs.

use serde_json::json;

use tb_domain::conversation::{ConversationRecord, RiskLevel, SystemEventName};
use tb_domain::conversation::Intent;
use tb_domain::stage::Stage;
use tb_domain::ticket::EscalationReason;
use tb_domain::trace::TraceEvent;
use tb_domain::Result;

use tb_llm::{CallEvents, CallKind, ClassifierResult, CLASSIFIER_SCHEMA};

use crate::state::AppState;

use super::{buttons, connectivity, escalate, step, texts, transition, TurnInput, TurnOutput};

const STORY_QUESTIONS: usize = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `ASK_PROBLEM` and `ASK_PROBLEM_CLARIFICATION`.
pub async fn handle(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    let Some(text) = input.input.text() else {
        return Ok(TurnOutput::text(texts::ask_problem(lang)));
    };

    // One-shot emotional beat before diving into diagnostics.
    if record.stage == Stage::AskProblem
        && !record.modes.emotional_release_used
        && super::detect_frustration(text)
    {
        record.modes.emotional_release_used = true;
        transition(record, Stage::EmotionalRelease, "emotional_release");
        return Ok(TurnOutput::with_buttons(
            texts::emotional_release(lang),
            buttons::defaults(Stage::EmotionalRelease, lang),
        ));
    }

    // Merge clarifications into the running problem description.
    let combined = match (&record.context.problem, record.stage) {
        (Some(prev), Stage::AskProblemClarification) => format!("{prev}. {text}"),
        _ => clip(text, 400),
    };
    record.context.problem = Some(clip(&combined, 600));

    let result = classify_text(state, record, &combined).await;
    route(state, record, result, false).await
}

/// `GUIDED_STORY`: three scripted, low-pressure questions, then one
/// classification of the combined story.
pub async fn guided_story(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    let answered = record.context.story_notes.len();
    let Some(text) = input.input.text() else {
        return Ok(TurnOutput::text(texts::story_question(
            lang,
            answered.min(STORY_QUESTIONS - 1),
        )));
    };

    record.context.story_notes.push(clip(text, 200));
    let answered = record.context.story_notes.len();
    if answered < STORY_QUESTIONS {
        return Ok(TurnOutput::text(texts::story_question(lang, answered)));
    }

    let mut combined = record.context.problem.clone().unwrap_or_default();
    combined.push_str(". ");
    combined.push_str(&record.context.story_notes.join(". "));
    record.context.problem = Some(clip(&combined, 600));
    record.context.story_notes.clear();

    let result = classify_text(state, record, &combined).await;
    route(state, record, result, true).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the classifier through the gateway; answer with the deterministic
/// fallback on any gateway error and leave the audit trail either way.
async fn classify_text(
    state: &AppState,
    record: &mut ConversationRecord,
    text: &str,
) -> ClassifierResult {
    if !state.llm.is_enabled() {
        record.push_system(
            SystemEventName::FallbackUsed,
            json!({ "kind": "classifier", "reason": "llm_disabled" }),
        );
        return ClassifierResult::fallback();
    }

    let prompt = build_prompt(record, text);
    let mut events = CallEvents::new();
    let outcome = state
        .llm
        .call(CallKind::Classifier, &prompt, &CLASSIFIER_SCHEMA, &mut events)
        .await;
    for (name, payload) in events {
        record.push_system(name, payload);
    }

    match outcome.and_then(|value| {
        let parsed: ClassifierResult = serde_json::from_value(value.clone())
            .map_err(|e| tb_domain::Error::LlmSchema(e.to_string()))?;
        record.push_system(SystemEventName::IaClassifierResult, value);
        Ok(parsed)
    }) {
        Ok(result) => result,
        Err(e) => {
            let reason = e.code().as_str();
            record.push_system(
                SystemEventName::FallbackUsed,
                json!({ "kind": "classifier", "reason": reason }),
            );
            TraceEvent::FallbackUsed {
                kind: "classifier".into(),
                reason: reason.into(),
            }
            .emit();
            ClassifierResult::fallback()
        }
    }
}

fn build_prompt(record: &ConversationRecord, text: &str) -> String {
    let ctx = &record.context;
    format!(
        "You classify requests arriving at a technical-service help desk.\n\
         Respond with ONLY a JSON object, no prose, with these fields:\n\
         - intent: one of network, install_os, install_app, hardware, software, \
         peripheral, account, billing, other, unknown\n\
         - needs_clarification: boolean\n\
         - missing: array of missing context fields (e.g. \"device_type\")\n\
         - suggested_next_ask: a stage id such as ASK_DEVICE_CATEGORY, or \"\"\n\
         - risk_level: low | medium | high (high = data loss or physical danger)\n\
         - suggest_modes: object with optional booleans ask_interaction_mode, \
         ask_learning_depth, ask_executor_role, activate_advisory_mode\n\
         - confidence: number between 0.0 and 1.0\n\n\
         Conversation context:\n\
         - language: {}\n\
         - user_level: {}\n\
         - device_category: {}\n\
         - device_type: {}\n\n\
         User description:\n{}",
        record.language.as_str(),
        record
            .user_level
            .map(|l| l.as_str())
            .unwrap_or("unknown"),
        ctx.device_category
            .map(|c| match c {
                tb_domain::conversation::DeviceCategory::Main => "main",
                tb_domain::conversation::DeviceCategory::External => "external",
            })
            .unwrap_or("unknown"),
        ctx.device_type.as_deref().unwrap_or("unknown"),
        clip(text, 800),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Apply one classifier verdict to the conversation.
async fn route(
    state: &AppState,
    record: &mut ConversationRecord,
    result: ClassifierResult,
    from_story: bool,
) -> Result<TurnOutput> {
    let lang = record.language;
    record.context.intent = Some(result.intent);
    record.context.risk_level = Some(result.risk_level);
    if result.suggest_modes.activate_advisory_mode {
        record.modes.advisory = true;
    }

    // Physical-danger trigger: keyword AND classifier flag.
    if record.context.risk_keywords_seen && result.risk_level == RiskLevel::High {
        return escalate::escalate(state, record, EscalationReason::RiskDetected);
    }

    // Low confidence: the guided story, not another clarification round.
    // Strictly below the threshold; 0.3 itself stays on the normal path.
    if !from_story && result.confidence < state.config.flow.guided_story_confidence {
        record.context.story_notes.clear();
        transition(record, Stage::GuidedStory, "low_confidence");
        return Ok(TurnOutput::text(texts::story_question(lang, 0)));
    }

    if result.needs_clarification {
        record.context.clarification_attempts += 1;
        if record.context.clarification_attempts
            >= state.config.flow.clarification_failures_threshold
        {
            return escalate::escalate(state, record, EscalationReason::MultipleAttemptsFailed);
        }

        // An onboarding re-ask the classifier suggested (e.g. the device
        // category is missing) beats a generic clarification question.
        if let Some(stage) = result
            .suggested_next_ask
            .as_deref()
            .and_then(Stage::parse)
        {
            if matches!(stage, Stage::AskDeviceCategory) {
                transition(record, stage, "classifier_suggested");
                return Ok(TurnOutput::with_buttons(
                    texts::ask_device_category(lang),
                    buttons::defaults(stage, lang),
                ));
            }
        }

        transition(record, Stage::AskProblemClarification, "needs_clarification");
        return Ok(TurnOutput::text(texts::clarification_fallback(lang)));
    }
    record.context.clarification_attempts = 0;

    let target = target_for_intent(result.intent);

    // Risk gate before any medium/high diagnostic path, shown exactly once.
    if result.risk_level >= RiskLevel::Medium && !record.context.risk_summary_shown {
        record.context.risk_summary_shown = true;
        record.context.pending_target = Some(target);
        record.push_system(
            SystemEventName::RiskSummaryShown,
            json!({ "risk_level": result.risk_level, "target": target.as_str() }),
        );
        transition(record, Stage::RiskConfirmation, "risk_gate");
        return Ok(TurnOutput::with_buttons(
            texts::risk_summary(lang),
            buttons::defaults(Stage::RiskConfirmation, lang),
        ));
    }

    // Preference probes the classifier asked for, one stage each.
    let mut probes = Vec::new();
    if result.suggest_modes.ask_interaction_mode && record.modes.interaction.is_none() {
        probes.push(Stage::AskInteractionMode);
    }
    if result.suggest_modes.ask_learning_depth && record.modes.learning_depth.is_none() {
        probes.push(Stage::AskLearningDepth);
    }
    if result.suggest_modes.ask_executor_role && record.modes.executor_role.is_none() {
        probes.push(Stage::AskExecutorRole);
    }
    if let Some(first) = probes.first().copied() {
        record.context.pending_target = Some(target);
        record.context.pending_probes = probes[1..].to_vec();
        transition(record, first, "mode_probe");
        return Ok(super::modes::probe_question(record, first));
    }

    enter_target(state, record, target).await
}

/// The diagnostic stage a classified intent lands on.
pub fn target_for_intent(intent: Intent) -> Stage {
    match intent {
        Intent::Network => Stage::ConnectivityFlow,
        Intent::InstallOs | Intent::InstallApp => Stage::InstallationStep,
        _ => Stage::DiagnosticStep,
    }
}

/// Enter a diagnostic stage and produce its first turn.
pub async fn enter_target(
    state: &AppState,
    record: &mut ConversationRecord,
    target: Stage,
) -> Result<TurnOutput> {
    match target {
        Stage::ConnectivityFlow => Ok(connectivity::enter(record)),
        Stage::InstallationStep | Stage::DiagnosticStep => {
            step::enter(state, record, target).await
        }
        // Routing tables only ever produce the three diagnostic stages.
        other => {
            tracing::warn!(stage = other.as_str(), "unexpected diagnostic target");
            step::enter(state, record, Stage::DiagnosticStep).await
        }
    }
}

pub fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
