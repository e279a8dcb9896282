//! The durable conversation record and its append-only transcript.
//!
//! One record per conversation, keyed by the six-character ID once it is
//! reserved. Before that, the record lives only in the session cache under
//! an opaque `session_id`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stage::{ButtonToken, Stage};

/// Current record schema. Loads of `1.0.0` records migrate forward
/// automatically; unknown future versions are marked `legacy_incompatible`.
pub const SCHEMA_VERSION: &str = "2.0.0";
/// Dialogue-flow revision carried for forensic reconstruction.
pub const FLOW_VERSION: &str = "1.2.0";
/// Bounded idempotency window (most recent request ids kept).
pub const PROCESSED_REQUESTS_CAP: usize = 32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation ID
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Six-character conversation identifier, `[A-Z]{2}[0-9]{4}`.
///
/// ASCII-only by construction, so `Ñ` can never appear. The same check
/// gates every filesystem path built from an ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    pub fn is_valid(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() == 6
            && b[..2].iter().all(|c| c.is_ascii_uppercase())
            && b[2..].iter().all(|c| c.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConversationId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if ConversationId::is_valid(&s) {
            Ok(ConversationId(s))
        } else {
            Err(format!("invalid conversation id: {s:?}"))
        }
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> String {
        id.0
    }
}

impl std::str::FromStr for ConversationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationId::try_from(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closed enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "es-AR")]
    EsAr,
    #[serde(rename = "en")]
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::EsAr => "es-AR",
            Language::En => "en",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Escalated,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    #[default]
    None,
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLevel {
    Basic,
    Intermediate,
    Advanced,
}

impl UserLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Basic => "basic",
            UserLevel::Intermediate => "intermediate",
            UserLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Network,
    InstallOs,
    InstallApp,
    Hardware,
    Software,
    Peripheral,
    Account,
    Billing,
    Other,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Frustrated,
    Anxious,
    Confused,
    Focused,
    Satisfied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    Main,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    Guided,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningDepth {
    Quick,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorRole {
    SelfService,
    Assisted,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Partial identity: a sanitized display name. PII is masked on the wire
/// and in deep-links via [`UserProfile::masked`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserProfile {
    /// First name plus surname initial ("Lucas García" → "Lucas G.").
    pub fn masked(&self) -> String {
        let name = match self.display_name.as_deref() {
            Some(n) if !n.trim().is_empty() => n.trim(),
            _ => return "cliente".to_string(),
        };
        let mut words = name.split_whitespace();
        let first = words.next().unwrap_or("cliente");
        match words.next().and_then(|w| w.chars().next()) {
            Some(initial) => format!("{first} {initial}."),
            None => first.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Working memory and modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-conversation working memory. All fields default so that records
/// written by older flow versions deserialize cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub device_category: Option<DeviceCategory>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub last_emotion: Option<Emotion>,
    /// Shortened forms of recent bot diagnostic steps (anti-repeat prompt input).
    #[serde(default)]
    pub recent_steps: Vec<String>,
    #[serde(default)]
    pub clarification_attempts: u32,
    #[serde(default)]
    pub diagnostic_attempts: u32,
    #[serde(default)]
    pub connectivity_step: Option<ConnectivityStep>,
    #[serde(default)]
    pub connectivity_retries: u32,
    #[serde(default)]
    pub risk_summary_shown: bool,
    /// Answers collected by the guided story before re-classification.
    #[serde(default)]
    pub story_notes: Vec<String>,
    /// Stage put on hold by a free-form question or a preference probe.
    #[serde(default)]
    pub suspended_stage: Option<Stage>,
    /// Preference probes still owed to the user, in order.
    #[serde(default)]
    pub pending_probes: Vec<Stage>,
    /// Diagnostic stage the flow lands on once probes / the risk gate clear.
    #[serde(default)]
    pub pending_target: Option<Stage>,
    /// Set when user text mentioned a dangerous physical condition.
    #[serde(default)]
    pub risk_keywords_seen: bool,
    /// True when the last user event was a `BTN_PERSIST` press.
    #[serde(default)]
    pub last_press_was_persist: bool,
    /// Bot turns emitted so far (drives the sparse name-use cadence).
    #[serde(default)]
    pub bot_turns: u32,
}

/// Deterministic connectivity sub-FSM position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStep {
    WifiOrWired,
    NotebookOrDesktop,
    SsidVisible,
    AnotherDeviceOnline,
    OneBoxOrTwo,
    Lights,
    PowerCycle,
}

/// Cross-cutting toggles that survive stage changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modes {
    #[serde(default)]
    pub emotional_release_used: bool,
    #[serde(default)]
    pub advisory: bool,
    #[serde(default)]
    pub interaction: Option<InteractionMode>,
    #[serde(default)]
    pub learning_depth: Option<LearningDepth>,
    #[serde(default)]
    pub executor_role: Option<ExecutorRole>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Buttons
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub token: ButtonToken,
    pub label: String,
    pub order: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One immutable transcript entry. Serialized shape:
/// `{t, role, kind, ...}` with the payload flattened beside the tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEvent {
    User {
        t: DateTime<Utc>,
        #[serde(flatten)]
        event: UserEvent,
    },
    Bot {
        t: DateTime<Utc>,
        #[serde(flatten)]
        event: BotEvent,
    },
    System {
        t: DateTime<Utc>,
        #[serde(flatten)]
        event: SystemEvent,
    },
}

impl TranscriptEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TranscriptEvent::User { t, .. }
            | TranscriptEvent::Bot { t, .. }
            | TranscriptEvent::System { t, .. } => *t,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserEvent {
    Text { text: String },
    Button { label: String, value: ButtonToken },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BotEvent {
    Text { text: String },
    Buttons { text: String, buttons: Vec<Button> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemEvent {
    Event {
        name: SystemEventName,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        payload: Value,
    },
}

/// Closed catalog of system transcript events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemEventName {
    StageChanged,
    ConversationIdAssigned,
    IaCallStart,
    IaCallPayloadSummary,
    IaCallResultRaw,
    IaClassifierResult,
    IaStepResult,
    IaCallValidationFail,
    FallbackUsed,
    RiskSummaryShown,
    Escalated,
    ImageAttached,
    TransitionClamped,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire reply (also stored for idempotent replay)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRef {
    pub conversation_id: ConversationId,
    pub contact_url: String,
}

/// Success body of `POST /chat` and `POST /greeting`. Stored verbatim in
/// `processed_requests` so a duplicate request replays byte-equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub stage: Stage,
    pub reply: String,
    pub buttons: Vec<Button>,
    pub end: bool,
    pub ticket: Option<TicketRef>,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRequest {
    pub request_id: String,
    pub response: ChatReply,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// `None` only before language selection; never persisted without one.
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Opaque client-side continuity key, minted at `/greeting`.
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "d_flow_version")]
    pub flow_version: String,
    #[serde(default = "d_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub user: UserProfile,
    #[serde(default)]
    pub user_level: Option<UserLevel>,
    #[serde(default = "d_stage")]
    pub stage: Stage,
    #[serde(default)]
    pub context: ConversationContext,
    #[serde(default)]
    pub modes: Modes,
    /// Set when a record written by a future schema could not be migrated.
    #[serde(default)]
    pub legacy_incompatible: bool,
    #[serde(default)]
    pub processed_requests: VecDeque<ProcessedRequest>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEvent>,
}

fn d_flow_version() -> String {
    FLOW_VERSION.to_string()
}
fn d_schema_version() -> String {
    "1.0.0".to_string()
}
fn d_stage() -> Stage {
    Stage::AskConsent
}

impl ConversationRecord {
    pub fn new_session(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: None,
            session_id,
            created_at: now,
            updated_at: now,
            flow_version: FLOW_VERSION.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            language: Language::default(),
            status: Status::default(),
            feedback: Feedback::default(),
            user: UserProfile::default(),
            user_level: None,
            stage: Stage::AskConsent,
            context: ConversationContext::default(),
            modes: Modes::default(),
            legacy_incompatible: false,
            processed_requests: VecDeque::new(),
            transcript: Vec::new(),
        }
    }

    /// Server-assigned timestamp for the next event, clamped so the
    /// transcript stays monotonically non-decreasing even across clock
    /// slews.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.transcript.last().map(TranscriptEvent::timestamp) {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn push(&mut self, event: TranscriptEvent) {
        self.updated_at = event.timestamp();
        self.transcript.push(event);
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        let t = self.next_timestamp();
        self.push(TranscriptEvent::User {
            t,
            event: UserEvent::Text { text: text.into() },
        });
    }

    pub fn push_user_button(&mut self, label: impl Into<String>, value: ButtonToken) {
        let t = self.next_timestamp();
        self.push(TranscriptEvent::User {
            t,
            event: UserEvent::Button {
                label: label.into(),
                value,
            },
        });
    }

    pub fn push_bot_text(&mut self, text: impl Into<String>) {
        let t = self.next_timestamp();
        self.push(TranscriptEvent::Bot {
            t,
            event: BotEvent::Text { text: text.into() },
        });
        self.context.bot_turns += 1;
    }

    pub fn push_bot_buttons(&mut self, text: impl Into<String>, buttons: Vec<Button>) {
        let t = self.next_timestamp();
        self.push(TranscriptEvent::Bot {
            t,
            event: BotEvent::Buttons {
                text: text.into(),
                buttons,
            },
        });
        self.context.bot_turns += 1;
    }

    /// Append a pre-built event, clamping its timestamp so the transcript
    /// stays non-decreasing.
    pub fn append_event(&mut self, mut event: TranscriptEvent) {
        let floor = self.next_timestamp();
        let t = match &mut event {
            TranscriptEvent::User { t, .. }
            | TranscriptEvent::Bot { t, .. }
            | TranscriptEvent::System { t, .. } => t,
        };
        if *t < floor {
            *t = floor;
        }
        self.push(event);
    }

    pub fn push_system(&mut self, name: SystemEventName, payload: Value) {
        let t = self.next_timestamp();
        self.push(TranscriptEvent::System {
            t,
            event: SystemEvent::Event { name, payload },
        });
    }

    /// Record a served response for idempotent replay; oldest evicted.
    pub fn record_processed(&mut self, request_id: &str, response: ChatReply) {
        if request_id.is_empty() {
            return;
        }
        if self.processed_requests.len() >= PROCESSED_REQUESTS_CAP {
            self.processed_requests.pop_front();
        }
        self.processed_requests.push_back(ProcessedRequest {
            request_id: request_id.to_string(),
            response,
        });
    }

    pub fn find_processed(&self, request_id: &str) -> Option<&ChatReply> {
        if request_id.is_empty() {
            return None;
        }
        self.processed_requests
            .iter()
            .find(|p| p.request_id == request_id)
            .map(|p| &p.response)
    }

    /// The storage key this record must live under, once assigned.
    pub fn storage_key(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_format() {
        assert!(ConversationId::is_valid("AB1234"));
        assert!(!ConversationId::is_valid("ab1234"));
        assert!(!ConversationId::is_valid("A12345"));
        assert!(!ConversationId::is_valid("ABC123"));
        assert!(!ConversationId::is_valid("AB123"));
        assert!(!ConversationId::is_valid("ÑA1234"));
    }

    #[test]
    fn id_serde_rejects_invalid() {
        let ok: Result<ConversationId, _> = serde_json::from_str("\"ZZ9999\"");
        assert!(ok.is_ok());
        let bad: Result<ConversationId, _> = serde_json::from_str("\"zz9999\"");
        assert!(bad.is_err());
    }

    #[test]
    fn masked_name() {
        let mut user = UserProfile::default();
        assert_eq!(user.masked(), "cliente");
        user.display_name = Some("Lucas".into());
        assert_eq!(user.masked(), "Lucas");
        user.display_name = Some("Lucas García".into());
        assert_eq!(user.masked(), "Lucas G.");
    }

    #[test]
    fn transcript_timestamps_non_decreasing() {
        let mut rec = ConversationRecord::new_session("s1".into());
        rec.push_user_text("hola");
        rec.push_bot_text("hola!");
        rec.push_system(SystemEventName::StageChanged, serde_json::json!({}));
        let ts: Vec<_> = rec.transcript.iter().map(|e| e.timestamp()).collect();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn transcript_event_wire_shape() {
        let mut rec = ConversationRecord::new_session("s1".into());
        rec.push_user_button("Sí, acepto", ButtonToken::ConsentYes);
        let v = serde_json::to_value(&rec.transcript[0]).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["kind"], "button");
        assert_eq!(v["value"], "BTN_CONSENT_YES");

        rec.push_system(
            SystemEventName::ConversationIdAssigned,
            serde_json::json!({"conversation_id": "AB1234"}),
        );
        let v = serde_json::to_value(&rec.transcript[1]).unwrap();
        assert_eq!(v["role"], "system");
        assert_eq!(v["kind"], "event");
        assert_eq!(v["name"], "CONVERSATION_ID_ASSIGNED");
    }

    #[test]
    fn processed_requests_bounded_and_replayable() {
        let mut rec = ConversationRecord::new_session("s1".into());
        let reply = |id: &str| ChatReply {
            ok: true,
            conversation_id: None,
            session_id: Some("s1".into()),
            stage: Stage::AskConsent,
            reply: format!("reply-{id}"),
            buttons: vec![],
            end: false,
            ticket: None,
            request_id: id.to_string(),
        };
        for i in 0..40 {
            let id = format!("req-{i}");
            rec.record_processed(&id, reply(&id));
        }
        assert_eq!(rec.processed_requests.len(), PROCESSED_REQUESTS_CAP);
        assert!(rec.find_processed("req-0").is_none(), "oldest evicted");
        let last = rec.find_processed("req-39").unwrap();
        assert_eq!(last.reply, "reply-req-39");
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut rec = ConversationRecord::new_session("s1".into());
        rec.conversation_id = Some("QX4821".parse().unwrap());
        rec.user_level = Some(UserLevel::Basic);
        rec.push_user_text("no tengo internet");
        let json = serde_json::to_string(&rec).unwrap();
        let back: ConversationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.conversation_id, rec.conversation_id);
        assert_eq!(back.transcript.len(), 1);
        assert_eq!(back.user_level, Some(UserLevel::Basic));
    }
}
