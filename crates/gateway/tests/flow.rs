//! End-to-end conversation flows driven against a scripted LLM mock and a
//! temp data root: onboarding, classifier routing, the connectivity
//! sub-FSM, escalation, the risk gate, timeout fallbacks, and idempotent
//! replay.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tb_domain::config::Config;
use tb_domain::conversation::{
    ChatReply, ConversationRecord, Status, SystemEvent, SystemEventName, TranscriptEvent,
};
use tb_domain::stage::{ButtonToken, Stage};
use tb_domain::Result;

use tb_llm::{ChatModel, CompletionRequest, LlmGateway};
use tb_store::{ConversationRepo, IdReserver, ImageIntake, TicketStore};

use tb_gateway::flow::{texts, TurnInput, UserInput};
use tb_gateway::runtime::limits::RateWindows;
use tb_gateway::runtime::lock::ConversationLockMap;
use tb_gateway::runtime::run_turn;
use tb_gateway::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scripted provider: pops one canned body per call, optionally stalling
/// first (to exercise the gateway timeout).
struct ScriptedModel {
    responses: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _req: CompletionRequest) -> Result<String> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(tb_domain::Error::Http("script exhausted".into()))
        } else {
            Ok(responses.remove(0))
        }
    }
}

fn scripted(responses: Vec<String>) -> Arc<dyn ChatModel> {
    Arc::new(ScriptedModel {
        responses: Mutex::new(responses),
        delay: None,
    })
}

fn stalled() -> Arc<dyn ChatModel> {
    Arc::new(ScriptedModel {
        responses: Mutex::new(vec!["{}".into()]),
        delay: Some(Duration::from_millis(500)),
    })
}

fn test_state(dir: &Path, model: Option<Arc<dyn ChatModel>>, timeout_ms: u64) -> AppState {
    let mut config = Config::default();
    config.storage.data_root = dir.to_path_buf();
    config.server.admin_token = Some("secret".into());
    config.escalation.contact_number = "5493415550000".into();
    config.escalation.contact_url_base = "https://wa.me/".into();
    config.escalation.public_base_url = "https://support.example.com".into();
    config.llm.timeout_ms = timeout_ms;
    let config = Arc::new(config);

    AppState {
        llm: Arc::new(LlmGateway::new(model, config.llm.clone())),
        repo: Arc::new(
            ConversationRepo::new(&config.storage.conversations_dir(), 64).unwrap(),
        ),
        ids: Arc::new(
            IdReserver::new(
                config.storage.used_ids_file(),
                config.storage.used_ids_lock(),
            )
            .unwrap(),
        ),
        tickets: Arc::new(TicketStore::new(&config.storage.tickets_dir()).unwrap()),
        images: Arc::new(
            ImageIntake::new(&config.storage.uploads_dir(), 5 * 1024 * 1024).unwrap(),
        ),
        locks: Arc::new(ConversationLockMap::new()),
        limits: Arc::new(RateWindows::new()),
        admin_token_hash: None,
        config,
    }
}

async fn turn_text(state: &AppState, record: &mut ConversationRecord, text: &str) -> ChatReply {
    run_turn(
        state,
        record,
        TurnInput {
            request_id: uuid::Uuid::new_v4().to_string(),
            input: UserInput::Text(text.to_string()),
            image_base64: None,
        },
    )
    .await
    .unwrap()
}

async fn turn_button(
    state: &AppState,
    record: &mut ConversationRecord,
    token: ButtonToken,
) -> ChatReply {
    run_turn(
        state,
        record,
        TurnInput {
            request_id: uuid::Uuid::new_v4().to_string(),
            input: UserInput::Button {
                value: token,
                label: texts::button_label(token, record.language).to_string(),
            },
            image_base64: None,
        },
    )
    .await
    .unwrap()
}

/// Consent → language → name → level → device, leaving the record at
/// `ASK_PROBLEM` with an assigned ID.
async fn onboard(state: &AppState, name: &str) -> ConversationRecord {
    let mut record = ConversationRecord::new_session(uuid::Uuid::new_v4().to_string());

    let r = turn_button(state, &mut record, ButtonToken::ConsentYes).await;
    assert_eq!(r.stage, Stage::AskLanguage);

    let r = turn_button(state, &mut record, ButtonToken::LangEsAr).await;
    assert_eq!(r.stage, Stage::AskName);
    assert!(r.conversation_id.is_some());

    let r = turn_text(state, &mut record, name).await;
    assert_eq!(r.stage, Stage::AskUserLevel);

    let r = turn_button(state, &mut record, ButtonToken::UserLevelBasic).await;
    assert_eq!(r.stage, Stage::AskDeviceCategory);

    let r = turn_button(state, &mut record, ButtonToken::DeviceMain).await;
    assert_eq!(r.stage, Stage::AskDeviceTypeMain);

    let r = turn_button(state, &mut record, ButtonToken::Notebook).await;
    assert_eq!(r.stage, Stage::AskProblem);

    record
}

fn count_system_events(record: &ConversationRecord, name: SystemEventName) -> usize {
    record
        .transcript
        .iter()
        .filter(|e| {
            matches!(
                e,
                TranscriptEvent::System {
                    event: SystemEvent::Event { name: n, .. },
                    ..
                } if *n == name
            )
        })
        .count()
}

fn classifier_json(intent: &str, risk: &str, confidence: f64) -> String {
    serde_json::json!({
        "intent": intent,
        "needs_clarification": false,
        "missing": [],
        "suggested_next_ask": "",
        "risk_level": risk,
        "suggest_modes": {},
        "confidence": confidence,
    })
    .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1: happy path — network issue on a notebook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_path_network_enters_connectivity_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![classifier_json("network", "low", 0.9)])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;

    // No record on disk before the ID existed; exactly one assignment event.
    let id = record.conversation_id.clone().unwrap();
    assert!(tb_domain::conversation::ConversationId::is_valid(id.as_str()));
    assert_eq!(
        count_system_events(&record, SystemEventName::ConversationIdAssigned),
        1
    );
    assert!(dir
        .path()
        .join("conversations")
        .join(format!("{}.json", id.as_str()))
        .exists());

    let r = turn_text(&state, &mut record, "no tengo internet").await;
    assert_eq!(r.stage, Stage::ConnectivityFlow);
    let tokens: Vec<_> = r.buttons.iter().map(|b| b.token).collect();
    assert_eq!(tokens, vec![ButtonToken::Wifi, ButtonToken::Wired]);
    assert_eq!(
        r.buttons.iter().map(|b| b.order).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2: two strikes → escalation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn second_persist_escalates_with_a_single_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![classifier_json("network", "low", 0.9)])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;
    turn_text(&state, &mut record, "no tengo internet").await;

    turn_button(&state, &mut record, ButtonToken::Wifi).await;
    turn_button(&state, &mut record, ButtonToken::Notebook).await;
    let r = turn_button(&state, &mut record, ButtonToken::No).await; // SSID not visible
    assert!(r.reply.contains("1."), "expected the power-cycle script");

    // First persist: one attempt, an alternative step, still self-service.
    let r = turn_button(&state, &mut record, ButtonToken::Persist).await;
    assert_eq!(record.context.diagnostic_attempts, 1);
    assert_eq!(record.status, Status::Open);
    assert!(r.ticket.is_none());

    // Second persist: threshold reached, ticket minted.
    let r = turn_button(&state, &mut record, ButtonToken::Persist).await;
    assert_eq!(record.context.diagnostic_attempts, 2);
    assert_eq!(record.status, Status::Escalated);
    let ticket = r.ticket.expect("handover turn carries the ticket");
    let id = record.conversation_id.clone().unwrap();
    assert!(ticket
        .contact_url
        .starts_with("https://wa.me/5493415550000?text="));
    assert!(ticket.contact_url.contains(id.as_str()));
    assert_eq!(count_system_events(&record, SystemEventName::Escalated), 1);

    // A later trigger returns the same ticket instead of minting another.
    let r = turn_button(&state, &mut record, ButtonToken::ConnectTech).await;
    assert_eq!(r.ticket.unwrap().contact_url, ticket.contact_url);
    let tickets: Vec<_> = std::fs::read_dir(dir.path().join("tickets"))
        .unwrap()
        .filter(|e| {
            e.as_ref().unwrap().path().extension() == Some("json".as_ref())
        })
        .collect();
    assert_eq!(tickets.len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3: risk gate on install
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn high_risk_install_passes_through_the_risk_gate_once() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![classifier_json("install_os", "high", 0.9)])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;
    let r = turn_text(&state, &mut record, "quiero reinstalar windows").await;

    assert_eq!(r.stage, Stage::RiskConfirmation);
    assert!(record.context.risk_summary_shown);
    assert_eq!(
        count_system_events(&record, SystemEventName::RiskSummaryShown),
        1
    );
    let tokens: Vec<_> = r.buttons.iter().map(|b| b.token).collect();
    assert_eq!(tokens, vec![ButtonToken::RiskContinue, ButtonToken::RiskCancel]);

    // Cancel returns to the problem intake.
    let r = turn_button(&state, &mut record, ButtonToken::RiskCancel).await;
    assert_eq!(r.stage, Stage::AskProblem);
}

#[tokio::test]
async fn risk_continue_advances_to_installation_step() {
    let dir = tempfile::tempdir().unwrap();
    let step_json = serde_json::json!({
        "reply": "Primero hacé un backup completo de tus archivos en un disco externo. ¿Listo?",
        "buttons": [
            { "token": "BTN_SOLVED", "label": "Listo" },
            { "token": "BTN_PERSIST", "label": "No puedo" }
        ],
        "emotion": "neutral"
    })
    .to_string();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![
            classifier_json("install_os", "high", 0.9),
            step_json,
        ])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;
    turn_text(&state, &mut record, "quiero reinstalar windows").await;
    let r = turn_button(&state, &mut record, ButtonToken::RiskContinue).await;

    assert_eq!(r.stage, Stage::InstallationStep);
    assert!(r.reply.contains("backup"));
    assert!(r
        .buttons
        .iter()
        .all(|b| Stage::InstallationStep.spec().allowed.contains(&b.token)));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4: LLM timeout falls back deterministically
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn classifier_timeout_uses_fallback_and_conversation_survives() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), Some(stalled()), 1);

    let mut record = onboard(&state, "Lucas").await;
    let r = turn_text(&state, &mut record, "mi pc hace algo raro").await;

    assert!(count_system_events(&record, SystemEventName::FallbackUsed) >= 1);
    assert_eq!(record.status, Status::Open);
    // The fallback's 0.0 confidence routes into the guided story.
    assert_eq!(r.stage, Stage::GuidedStory);
    assert!(!r.reply.is_empty());
}

#[tokio::test]
async fn confidence_exactly_at_threshold_stays_on_the_normal_path() {
    let dir = tempfile::tempdir().unwrap();
    let step_json = serde_json::json!({
        "reply": "Reiniciá la aplicación y contame si vuelve a pasar.",
        "buttons": [{ "token": "BTN_SOLVED", "label": "Funcionó" }],
        "emotion": "neutral"
    })
    .to_string();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![
            classifier_json("software", "low", 0.3),
            step_json,
        ])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;
    let r = turn_text(&state, &mut record, "se cierra el programa").await;

    // The guided-story threshold is strict: 0.3 itself routes normally.
    assert_eq!(r.stage, Stage::DiagnosticStep);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5: idempotent retry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn duplicate_request_id_replays_byte_equal_with_no_new_events() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None, 5_000);

    let mut record = ConversationRecord::new_session("sess-idem".into());
    let input = TurnInput {
        request_id: "req-fixed".into(),
        input: UserInput::Button {
            value: ButtonToken::ConsentYes,
            label: "Sí, acepto".into(),
        },
        image_base64: None,
    };

    let first = run_turn(&state, &mut record, input.clone()).await.unwrap();
    let events_after_first = record.transcript.len();

    let second = run_turn(&state, &mut record, input).await.unwrap();
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(record.transcript.len(), events_after_first);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 6: concurrent language selections get distinct IDs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn concurrent_language_selections_reserve_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(test_state(dir.path(), None, 5_000));

    let mut handles = Vec::new();
    for i in 0..20 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let mut record = ConversationRecord::new_session(format!("sess-{i}"));
            turn_button(&state, &mut record, ButtonToken::ConsentYes).await;
            turn_button(&state, &mut record, ButtonToken::LangEsAr).await;
            record.conversation_id.unwrap()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for h in handles {
        assert!(ids.insert(h.await.unwrap()), "duplicate conversation id");
    }
    assert_eq!(ids.len(), 20);
    assert!(!dir.path().join("ids").join("used_ids.lock").exists());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extras: transcript ordering, explicit tech request, consent decline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn transcript_timestamps_never_decrease_across_a_whole_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![classifier_json("network", "low", 0.9)])),
        5_000,
    );

    let mut record = onboard(&state, "Ana María").await;
    turn_text(&state, &mut record, "no tengo internet").await;

    let ts: Vec<_> = record.transcript.iter().map(|e| e.timestamp()).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn explicit_technician_request_escalates_from_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None, 5_000);

    let mut record = onboard(&state, "Lucas").await;
    let r = turn_text(&state, &mut record, "quiero hablar con un técnico ya").await;

    assert_eq!(record.status, Status::Escalated);
    assert!(r.ticket.is_some());
    // The handover turn always offers the final close button.
    assert!(r.buttons.iter().any(|b| b.token == ButtonToken::Close));
}

#[tokio::test]
async fn escalation_from_a_stage_without_close_still_offers_the_close_button() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None, 5_000);

    // Stop onboarding at ASK_USER_LEVEL, a stage whose own allow-list has
    // no close button.
    let mut record = ConversationRecord::new_session("sess-mid".into());
    turn_button(&state, &mut record, ButtonToken::ConsentYes).await;
    turn_button(&state, &mut record, ButtonToken::LangEsAr).await;
    let r = turn_text(&state, &mut record, "Lucas").await;
    assert_eq!(r.stage, Stage::AskUserLevel);
    assert!(!Stage::AskUserLevel.spec().allowed.contains(&ButtonToken::Close));

    let r = turn_text(&state, &mut record, "quiero hablar con un técnico").await;
    assert_eq!(record.status, Status::Escalated);
    assert!(r.ticket.is_some());
    let tokens: Vec<_> = r.buttons.iter().map(|b| b.token).collect();
    assert_eq!(tokens, vec![ButtonToken::Close]);
    assert_eq!(r.buttons[0].order, 1);

    // Every later turn keeps offering the way out...
    let r = turn_text(&state, &mut record, "y ahora qué hago?").await;
    assert!(r.buttons.iter().any(|b| b.token == ButtonToken::Close));

    // ...and the escalated status admits exactly that button.
    assert_eq!(
        record.stage.allowed_for(record.status),
        &[ButtonToken::Close]
    );
    let r = turn_button(&state, &mut record, ButtonToken::Close).await;
    assert!(r.end);
    assert_eq!(record.stage, Stage::Ended);
}

#[tokio::test]
async fn consent_decline_closes_politely() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None, 5_000);

    let mut record = ConversationRecord::new_session("sess-no".into());
    let r = turn_button(&state, &mut record, ButtonToken::ConsentNo).await;

    assert!(r.end);
    assert_eq!(record.status, Status::Closed);
    assert_eq!(record.stage, Stage::Ended);
    // Declined greetings never reserve an ID.
    assert!(record.conversation_id.is_none());
}

#[tokio::test]
async fn solved_then_feedback_closes_the_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Some(scripted(vec![classifier_json("network", "low", 0.9)])),
        5_000,
    );

    let mut record = onboard(&state, "Lucas").await;
    turn_text(&state, &mut record, "no tengo internet").await;
    let r = turn_button(&state, &mut record, ButtonToken::Solved).await;
    assert_eq!(r.stage, Stage::AskFeedback);

    let r = turn_button(&state, &mut record, ButtonToken::FeedbackPositive).await;
    assert!(r.end);
    assert_eq!(
        record.feedback,
        tb_domain::conversation::Feedback::Positive
    );
    assert_eq!(record.status, Status::Closed);
}
