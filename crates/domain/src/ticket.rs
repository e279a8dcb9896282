use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationId, UserProfile};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ticket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a conversation was handed over to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MultipleAttemptsFailed,
    UserRequested,
    RiskDetected,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::MultipleAttemptsFailed => "multiple_attempts_failed",
            EscalationReason::UserRequested => "user_requested",
            EscalationReason::RiskDetected => "risk_detected",
        }
    }
}

/// One ticket per conversation; read-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Also the ticket's primary key.
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    /// Snapshot of the user at escalation time.
    pub user: UserProfile,
    /// One-line problem summary from the conversation context.
    pub problem: String,
    pub reason: EscalationReason,
    /// Opaque reference back to the conversation record.
    pub transcript_pointer: String,
    /// Pre-computed out-of-band messaging deep-link.
    pub contact_url: String,
}
