//! Deterministic side-stages: the risk gate, preference probes, emotional
//! release, context resume, feedback, and question suspension.

use tb_domain::conversation::{
    ConversationRecord, ExecutorRole, Feedback, InteractionMode, LearningDepth, Status,
};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::Result;

use tb_llm::{CallEvents, CallKind, StepResult, STEP_SCHEMA};

use crate::state::AppState;

use super::{buttons, classify, texts, transition, TurnInput, TurnOutput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk confirmation gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn risk_confirmation(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    match input.input.button() {
        Some(ButtonToken::RiskCancel) => {
            record.context.pending_target = None;
            transition(record, Stage::AskProblem, "risk_cancelled");
            Ok(TurnOutput::text(texts::risk_cancelled(lang)))
        }
        Some(ButtonToken::RiskContinue) => {
            let target = record
                .context
                .pending_target
                .take()
                .unwrap_or(Stage::InstallationStep);
            classify::enter_target(state, record, target).await
        }
        _ => Ok(TurnOutput::with_buttons(
            texts::risk_summary(lang),
            buttons::defaults(Stage::RiskConfirmation, lang),
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preference probes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The question turn for one probe stage.
pub fn probe_question(record: &ConversationRecord, stage: Stage) -> TurnOutput {
    let lang = record.language;
    let text = match stage {
        Stage::AskInteractionMode => texts::ask_interaction_mode(lang),
        Stage::AskLearningDepth => texts::ask_learning_depth(lang),
        Stage::AskExecutorRole => texts::ask_executor_role(lang),
        _ => texts::use_buttons(lang),
    };
    TurnOutput::with_buttons(text, buttons::defaults(stage, lang))
}

/// Handle the answer to a probe, then move on to the next probe or the
/// pending diagnostic stage.
pub async fn preference_probe(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let stage = record.stage;
    let answered = match (stage, input.input.button()) {
        (Stage::AskInteractionMode, Some(ButtonToken::ModeGuided)) => {
            record.modes.interaction = Some(InteractionMode::Guided);
            true
        }
        (Stage::AskInteractionMode, Some(ButtonToken::ModeFree)) => {
            record.modes.interaction = Some(InteractionMode::Free);
            true
        }
        (Stage::AskLearningDepth, Some(ButtonToken::DepthQuick)) => {
            record.modes.learning_depth = Some(LearningDepth::Quick);
            true
        }
        (Stage::AskLearningDepth, Some(ButtonToken::DepthDeep)) => {
            record.modes.learning_depth = Some(LearningDepth::Deep);
            true
        }
        (Stage::AskExecutorRole, Some(ButtonToken::RoleSelf)) => {
            record.modes.executor_role = Some(ExecutorRole::SelfService);
            true
        }
        (Stage::AskExecutorRole, Some(ButtonToken::RoleAssisted)) => {
            record.modes.executor_role = Some(ExecutorRole::Assisted);
            true
        }
        _ => false,
    };

    if !answered {
        return Ok(probe_question(record, stage));
    }

    if !record.context.pending_probes.is_empty() {
        let next = record.context.pending_probes.remove(0);
        transition(record, next, "mode_probe");
        return Ok(probe_question(record, next));
    }

    let target = record
        .context
        .pending_target
        .take()
        .unwrap_or(Stage::DiagnosticStep);
    classify::enter_target(state, record, target).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emotional release
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn emotional_release(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;
    match &input.input {
        super::UserInput::Button { value, .. } if *value == ButtonToken::Problema => {
            transition(record, Stage::AskProblem, "release_done");
            Ok(TurnOutput::text(texts::ask_problem(lang)))
        }
        super::UserInput::Text(_) => {
            // The vent already carried the problem description: classify it.
            transition(record, Stage::AskProblem, "release_done");
            classify::handle(state, record, input).await
        }
        _ => Ok(TurnOutput::with_buttons(
            texts::emotional_release(lang),
            buttons::defaults(Stage::EmotionalRelease, lang),
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context resume
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn context_resume(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    match input.input.button() {
        Some(ButtonToken::Resume) => {
            let target = record
                .context
                .suspended_stage
                .take()
                .unwrap_or(Stage::AskProblem);
            transition(record, target, "resumed");
            Ok(super::reprompt(record))
        }
        Some(ButtonToken::Problema) => {
            record.context.problem = None;
            record.context.intent = None;
            record.context.risk_level = None;
            record.context.diagnostic_attempts = 0;
            record.context.clarification_attempts = 0;
            record.context.connectivity_step = None;
            record.context.recent_steps.clear();
            transition(record, Stage::AskProblem, "new_problem");
            Ok(TurnOutput::text(texts::ask_problem(lang)))
        }
        _ => Ok(resume_summary(record)),
    }
}

/// The summary turn shown on `/resume/:id` and after suspensions.
pub fn resume_summary(record: &ConversationRecord) -> TurnOutput {
    let lang = record.language;
    let reply = match (&record.context.device_type, &record.context.problem) {
        (Some(device), Some(problem)) => {
            texts::resume_summary(lang, device, &classify::clip(problem, 120))
        }
        _ => texts::resume_no_context(lang).to_string(),
    };
    TurnOutput::with_buttons(reply, buttons::defaults(Stage::ContextResume, lang))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Question suspension
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A free-form question interrupted a button-driven stage: park the stage,
/// answer the question (LLM when the budget allows, canned otherwise), and
/// offer the way back.
pub async fn suspend_for_question(
    state: &AppState,
    record: &mut ConversationRecord,
    question: &str,
) -> Result<TurnOutput> {
    let lang = record.language;
    record.context.suspended_stage = Some(record.stage);
    transition(record, Stage::ContextResume, "question_suspension");

    let key = super::record_key(record);
    let budget_ok = state.limits.allow(
        &format!("llm:{key}"),
        state.config.llm.calls_per_min_per_conversation,
    );

    let reply = if state.llm.is_enabled() && budget_ok {
        let prompt = format!(
            "You are a friendly help-desk assistant. The user interrupted a \
             diagnostic flow with a side question. Answer it briefly (2-4 \
             lines, language: {}) and invite them to continue afterwards. \
             Respond with ONLY JSON: {{\"reply\": string, \"buttons\": [], \
             \"emotion\": string}}.\n\nQuestion: {}",
            record.language.as_str(),
            classify::clip(question, 300),
        );
        let mut events = CallEvents::new();
        let outcome = state
            .llm
            .call(CallKind::Step, &prompt, &STEP_SCHEMA, &mut events)
            .await;
        for (name, payload) in events {
            record.push_system(name, payload);
        }
        match outcome.and_then(|v| {
            serde_json::from_value::<StepResult>(v)
                .map_err(|e| tb_domain::Error::LlmSchema(e.to_string()))
        }) {
            Ok(step) => classify::clip(&step.reply, state.config.flow.reply_max_chars),
            Err(_) => texts::advisory_fallback(lang).to_string(),
        }
    } else {
        texts::advisory_fallback(lang).to_string()
    };

    Ok(TurnOutput::with_buttons(
        reply,
        buttons::defaults(Stage::ContextResume, lang),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feedback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn feedback(record: &mut ConversationRecord, input: &TurnInput) -> Result<TurnOutput> {
    let lang = record.language;
    let verdict = match input.input.button() {
        Some(ButtonToken::FeedbackPositive) => Feedback::Positive,
        Some(ButtonToken::FeedbackNegative) => Feedback::Negative,
        _ => {
            return Ok(TurnOutput::with_buttons(
                texts::solved_reply(lang),
                buttons::defaults(Stage::AskFeedback, lang),
            ))
        }
    };

    record.feedback = verdict;
    transition(record, Stage::Ended, "feedback_given");
    record.status = Status::Closed;
    Ok(TurnOutput::ended(texts::feedback_thanks(lang)))
}
