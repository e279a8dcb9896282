//! Step handler: produces one diagnostic or installation step at a time,
//! adapted to the user's level, emotion, and what has already been tried.

use serde_json::json;

use tb_domain::conversation::{ConversationRecord, Emotion, RiskLevel, SystemEventName, UserLevel};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::ticket::EscalationReason;
use tb_domain::trace::TraceEvent;
use tb_domain::Result;

use tb_llm::{CallEvents, CallKind, StepResult, STEP_SCHEMA};

use crate::state::AppState;

use super::classify::clip;
use super::{buttons, escalate, texts, transition, TurnInput, TurnOutput};

/// Why a new step is being generated; shapes the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepTrigger {
    First,
    Persisted,
    Advanced,
    ExtraInfo,
}

/// Transition into a step stage and produce its first step.
pub async fn enter(
    state: &AppState,
    record: &mut ConversationRecord,
    target: Stage,
) -> Result<TurnOutput> {
    let reason = match target {
        Stage::InstallationStep => "intent_install",
        _ => "intent_diagnostic",
    };
    transition(record, target, reason);
    generate(state, record, StepTrigger::First, None).await
}

/// `DIAGNOSTIC_STEP` and `INSTALLATION_STEP` turns.
pub async fn handle(
    state: &AppState,
    record: &mut ConversationRecord,
    input: &TurnInput,
) -> Result<TurnOutput> {
    let lang = record.language;

    match input.input.button() {
        Some(ButtonToken::Solved) => {
            transition(record, Stage::AskFeedback, "step_solved");
            Ok(TurnOutput::with_buttons(
                texts::solved_reply(lang),
                buttons::defaults(Stage::AskFeedback, lang),
            ))
        }
        Some(ButtonToken::Persist) => {
            record.context.diagnostic_attempts += 1;
            record.context.last_press_was_persist = true;
            if record.context.diagnostic_attempts
                >= state.config.flow.diagnostic_attempts_threshold
            {
                return escalate::escalate(state, record, EscalationReason::MultipleAttemptsFailed);
            }
            generate(state, record, StepTrigger::Persisted, None).await
        }
        Some(ButtonToken::AdvancedTests) => {
            generate(state, record, StepTrigger::Advanced, None).await
        }
        _ => {
            let extra = input.input.text().map(|t| clip(t, 300));
            // New symptoms plus an earlier high-risk classification end the
            // self-service path immediately.
            if record.context.risk_keywords_seen
                && record.context.risk_level == Some(RiskLevel::High)
            {
                return escalate::escalate(state, record, EscalationReason::RiskDetected);
            }
            generate(state, record, StepTrigger::ExtraInfo, extra).await
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate(
    state: &AppState,
    record: &mut ConversationRecord,
    trigger: StepTrigger,
    extra_info: Option<String>,
) -> Result<TurnOutput> {
    let stage = record.stage;
    let lang = record.language;

    if !state.llm.is_enabled() {
        return Ok(fallback(record, "llm_disabled"));
    }

    let prompt = build_prompt(state, record, trigger, extra_info.as_deref());
    let mut events = CallEvents::new();
    let outcome = state
        .llm
        .call(CallKind::Step, &prompt, &STEP_SCHEMA, &mut events)
        .await;
    for (name, payload) in events {
        record.push_system(name, payload);
    }

    let result: StepResult = match outcome.and_then(|value| {
        let parsed: StepResult = serde_json::from_value(value.clone())
            .map_err(|e| tb_domain::Error::LlmSchema(e.to_string()))?;
        record.push_system(SystemEventName::IaStepResult, value);
        Ok(parsed)
    }) {
        Ok(result) => result,
        Err(e) => return Ok(fallback(record, e.code().as_str())),
    };

    let reply = sanitize_reply(
        &result.reply,
        &state.config.flow.link_allow_domains,
        state.config.flow.reply_max_chars,
    );
    let step_buttons = buttons::enforce(stage, result.buttons, lang);

    record.context.last_emotion = Some(result.emotion);
    record.context.last_press_was_persist = false;
    remember_step(record, &reply);

    Ok(TurnOutput::with_buttons(reply, step_buttons))
}

fn fallback(record: &mut ConversationRecord, reason: &str) -> TurnOutput {
    let stage = record.stage;
    let lang = record.language;
    record.push_system(
        SystemEventName::FallbackUsed,
        json!({ "kind": "step", "reason": reason }),
    );
    TraceEvent::FallbackUsed {
        kind: "step".into(),
        reason: reason.into(),
    }
    .emit();

    let reply = texts::fallback_step(stage, lang).to_string();
    remember_step(record, &reply);
    TurnOutput::with_buttons(reply, buttons::defaults(stage, lang))
}

/// Keep a shortened history of emitted steps for the anti-repeat prompt.
fn remember_step(record: &mut ConversationRecord, reply: &str) {
    record.context.recent_steps.push(clip(reply, 160));
    while record.context.recent_steps.len() > 6 {
        record.context.recent_steps.remove(0);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt composition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_prompt(
    state: &AppState,
    record: &ConversationRecord,
    trigger: StepTrigger,
    extra_info: Option<&str>,
) -> String {
    let ctx = &record.context;
    let stage = record.stage;
    let level = record.user_level.unwrap_or(UserLevel::Basic);

    let mut p = String::with_capacity(2_048);
    p.push_str(
        "You are the step generator of a technical-service help desk. Propose \
         EXACTLY ONE next step the user can try now. Respond with ONLY a JSON \
         object: {\"reply\": string, \"buttons\": [{\"token\": string, \
         \"label\": string, \"order\": number}], \"emotion\": string}.\n",
    );
    p.push_str(
        "emotion is your read of the user's current state: neutral, frustrated, \
         anxious, confused, focused, or satisfied.\n",
    );

    // The closed token set this stage accepts; anything else is dropped.
    p.push_str("Allowed button tokens for this turn: ");
    let allowed = stage.spec().allowed;
    for (i, tok) in allowed.iter().enumerate() {
        if i > 0 {
            p.push_str(", ");
        }
        p.push_str(tok.as_str());
    }
    p.push_str(
        ". Labels must be short and in the user's language, coherent with the \
         reply (a \"did it work?\" reply pairs with solved/persist buttons).\n\n",
    );

    p.push_str(&format!(
        "Context:\n- stage: {}\n- language: {} (write the reply in it)\n- user_level: {}\n- device: {}\n- problem_category: {}\n- problem: {}\n",
        stage.as_str(),
        record.language.as_str(),
        level.as_str(),
        ctx.device_type.as_deref().unwrap_or("unknown"),
        ctx.intent
            .map(|i| format!("{i:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".into()),
        ctx.problem.as_deref().unwrap_or("unknown"),
    ));

    let history = ctx
        .recent_steps
        .iter()
        .rev()
        .take(state.config.flow.history_steps)
        .rev()
        .collect::<Vec<_>>();
    if !history.is_empty() {
        p.push_str("\nSteps already suggested — DO NOT repeat any of them:\n");
        for s in history {
            p.push_str("- ");
            p.push_str(s);
            p.push('\n');
        }
    }

    match trigger {
        StepTrigger::Persisted => p.push_str(
            "\nThe user pressed \"still the same\": the previous step did not \
             work. Propose a genuinely different approach, not a variation.\n",
        ),
        StepTrigger::Advanced => p.push_str(
            "\nThe user explicitly asked for advanced tests; a more technical \
             step is acceptable within the safety rules below.\n",
        ),
        StepTrigger::ExtraInfo => {
            if let Some(info) = extra_info {
                p.push_str("\nNew information from the user: ");
                p.push_str(info);
                p.push('\n');
            }
        }
        StepTrigger::First => {}
    }

    // Safety restrictions scale with the user's level.
    match level {
        UserLevel::Basic | UserLevel::Intermediate => p.push_str(
            "\nSafety rules: NEVER suggest formatting or partitioning drives, \
             BIOS/UEFI changes, opening the device physically, or complex \
             terminal commands without a full explanation. If solving this \
             genuinely requires such actions, say so briefly and recommend \
             contacting the human technician instead.\n",
        ),
        UserLevel::Advanced => p.push_str(
            "\nThe user is advanced: terminal commands are fine when explained. \
             Still avoid irreversible destructive actions without an explicit \
             backup warning.\n",
        ),
    }

    // Emotion-adaptive register.
    match ctx.last_emotion.unwrap_or(Emotion::Neutral) {
        Emotion::Focused => {
            p.push_str("\nTone: the user is focused. No emojis, at most 3 lines.\n")
        }
        Emotion::Frustrated | Emotion::Anxious => p.push_str(
            "\nTone: the user is stressed. Warm and calm, at most 1 emoji, 2-4 lines.\n",
        ),
        _ => p.push_str("\nTone: friendly, 1-2 emojis, 4-6 lines.\n"),
    }

    // Sparse name use: roughly a third of neutral turns, more freely when
    // emotions run high. Counter-based so replays stay deterministic.
    let emotional = matches!(
        ctx.last_emotion,
        Some(Emotion::Frustrated | Emotion::Anxious)
    );
    let use_name = match record.user.display_name.as_deref() {
        Some(_) => emotional || ctx.bot_turns % 3 == 0,
        None => false,
    };
    if use_name {
        if let Some(name) = record.user.display_name.as_deref() {
            p.push_str(&format!("\nAddress the user by name ({name}) once.\n"));
        }
    } else {
        p.push_str("\nDo not use the user's name this turn.\n");
    }

    p
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Post-generation sanitization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strip links whose host is outside the allow-list, then truncate.
fn sanitize_reply(reply: &str, allow_domains: &[String], max_chars: usize) -> String {
    let cleaned: String = reply
        .lines()
        .map(|line| {
            line.split_whitespace()
                .filter(|word| {
                    let Some(rest) = word
                        .strip_prefix("https://")
                        .or_else(|| word.strip_prefix("http://"))
                    else {
                        return true;
                    };
                    let host = rest.split('/').next().unwrap_or("");
                    allow_domains
                        .iter()
                        .any(|d| host == d || host.ends_with(&format!(".{d}")))
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n");

    clip(cleaned.trim(), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        vec!["example.com".into(), "wa.me".into()]
    }

    #[test]
    fn disallowed_links_are_stripped() {
        let reply = "Mirá esta guía: https://phishing.io/steal y después contanos.";
        let out = sanitize_reply(reply, &domains(), 500);
        assert!(!out.contains("phishing.io"));
        assert!(out.contains("Mirá esta guía:"));
    }

    #[test]
    fn allowed_links_survive_including_subdomains() {
        let reply = "Guía: https://docs.example.com/ayuda paso a paso";
        let out = sanitize_reply(reply, &domains(), 500);
        assert!(out.contains("https://docs.example.com/ayuda"));
    }

    #[test]
    fn lookalike_domains_are_not_allowed() {
        let reply = "https://evilexample.com/x";
        let out = sanitize_reply(reply, &domains(), 500);
        assert!(!out.contains("evilexample.com"));
    }

    #[test]
    fn reply_is_truncated() {
        let long = "a".repeat(5_000);
        assert_eq!(sanitize_reply(&long, &domains(), 100).chars().count(), 100);
    }

    #[test]
    fn newlines_survive_sanitization() {
        let reply = "1. Primero\n2. Segundo\n3. Tercero";
        assert_eq!(sanitize_reply(reply, &domains(), 500), reply);
    }
}
