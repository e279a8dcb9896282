use std::sync::Arc;

use tb_domain::config::Config;
use tb_llm::LlmGateway;
use tb_store::{ConversationRepo, IdReserver, ImageIntake, TicketStore};

use crate::runtime::limits::RateWindows;
use crate::runtime::lock::ConversationLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM gateway
/// - **Storage** — conversation repo (cache + disk), IDs, tickets, images
/// - **Concurrency & limits** — per-conversation locks, rate windows
/// - **Security** — startup-computed admin token digest
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<LlmGateway>,

    // ── Storage ───────────────────────────────────────────────────────
    pub repo: Arc<ConversationRepo>,
    pub ids: Arc<IdReserver>,
    pub tickets: Arc<TicketStore>,
    pub images: Arc<ImageIntake>,

    // ── Concurrency & limits ──────────────────────────────────────────
    pub locks: Arc<ConversationLockMap>,
    pub limits: Arc<RateWindows>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 of the admin bearer token (read once at startup).
    /// `None` means admin endpoints always answer 401.
    pub admin_token_hash: Option<Vec<u8>>,
}
