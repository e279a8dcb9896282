use serde::Serialize;

/// Structured trace events emitted across all Tecnibot crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ConversationCreated {
        session_id: String,
    },
    ConversationIdReserved {
        conversation_id: String,
        draw_attempts: u32,
    },
    StageChanged {
        conversation_id: String,
        from: String,
        to: String,
        reason: String,
    },
    TurnCompleted {
        conversation_id: String,
        stage: String,
        duration_ms: u64,
        llm_calls: u32,
    },
    LlmCall {
        kind: String,
        model: String,
        duration_ms: u64,
        outcome: String,
    },
    FallbackUsed {
        kind: String,
        reason: String,
    },
    DuplicateRequestReplayed {
        conversation_id: String,
        request_id: String,
    },
    RecordMigrated {
        conversation_id: String,
        from_version: String,
        to_version: String,
    },
    ImageStored {
        conversation_id: String,
        bytes: usize,
        ext: String,
    },
    TicketCreated {
        conversation_id: String,
        reason: String,
    },
    StaleLockReclaimed {
        age_secs: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tb_event");
    }
}
