use serde::{Deserialize, Serialize};

use super::{env_opt, env_parse, env_str};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Origins allowed for CORS. The widget origin goes here.
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
    /// Bearer token protecting `/trace/:id` and `/historial/:id`.
    /// Only its SHA-256 digest is kept after startup.
    #[serde(default, skip_serializing)]
    pub admin_token: Option<String>,
    #[serde(default)]
    pub limits: RequestLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            allowed_origins: d_origins(),
            admin_token: None,
            limits: RequestLimits::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", d_port()),
            host: env_str("HOST", &d_host()),
            allowed_origins: env_opt("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(d_origins),
            admin_token: env_opt("ADMIN_TOKEN"),
            limits: RequestLimits::from_env(),
        }
    }
}

/// Request-shaping knobs: rate limits, body caps, lock waits.
///
/// Units are in the field names (per-minute counts, bytes, milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLimits {
    /// `/chat` budget per IP per minute.
    #[serde(default = "d_chat_per_min")]
    pub chat_per_min_per_ip: u32,
    /// `/greeting` budget per IP per minute (stricter).
    #[serde(default = "d_greeting_per_min")]
    pub greeting_per_min_per_ip: u32,
    /// Global per-IP token bucket (backstop underneath the per-route windows).
    #[serde(default = "d_governor_rps")]
    pub governor_per_second: u64,
    #[serde(default = "d_governor_burst")]
    pub governor_burst: u32,
    /// In-flight request ceiling.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    /// Body cap for `/chat` (image payloads ride along).
    #[serde(default = "d_chat_body")]
    pub chat_body_bytes: usize,
    /// Body cap for everything else.
    #[serde(default = "d_default_body")]
    pub default_body_bytes: usize,
    /// Bounded wait for the per-conversation mutex before answering 503.
    #[serde(default = "d_lock_wait")]
    pub lock_wait_ms: u64,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            chat_per_min_per_ip: d_chat_per_min(),
            greeting_per_min_per_ip: d_greeting_per_min(),
            governor_per_second: d_governor_rps(),
            governor_burst: d_governor_burst(),
            max_concurrent: d_max_concurrent(),
            chat_body_bytes: d_chat_body(),
            default_body_bytes: d_default_body(),
            lock_wait_ms: d_lock_wait(),
        }
    }
}

impl RequestLimits {
    pub fn from_env() -> Self {
        Self {
            chat_per_min_per_ip: env_parse("CHAT_PER_MIN_PER_IP", d_chat_per_min()),
            greeting_per_min_per_ip: env_parse("GREETING_PER_MIN_PER_IP", d_greeting_per_min()),
            governor_per_second: env_parse("GOVERNOR_PER_SECOND", d_governor_rps()),
            governor_burst: env_parse("GOVERNOR_BURST", d_governor_burst()),
            max_concurrent: env_parse("MAX_CONCURRENT_REQUESTS", d_max_concurrent()),
            chat_body_bytes: env_parse("CHAT_BODY_BYTES", d_chat_body()),
            default_body_bytes: env_parse("DEFAULT_BODY_BYTES", d_default_body()),
            lock_wait_ms: env_parse("LOCK_WAIT_MS", d_lock_wait()),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    3001
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_origins() -> Vec<String> {
    vec!["https://example.com".into()]
}
fn d_chat_per_min() -> u32 {
    20
}
fn d_greeting_per_min() -> u32 {
    5
}
fn d_governor_rps() -> u64 {
    10
}
fn d_governor_burst() -> u32 {
    30
}
fn d_max_concurrent() -> usize {
    256
}
fn d_chat_body() -> usize {
    10 * 1024 * 1024
}
fn d_default_body() -> usize {
    64 * 1024
}
fn d_lock_wait() -> u64 {
    2_000
}
