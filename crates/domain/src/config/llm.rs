use serde::{Deserialize, Serialize};

use super::{env_opt, env_parse, env_str};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions endpoint.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Model for intent classification (small, deterministic).
    #[serde(default = "d_model_classifier")]
    pub model_classifier: String,
    /// Model for step generation (small, slightly creative).
    #[serde(default = "d_model_step")]
    pub model_step: String,
    /// Hard ceiling raced against every provider call.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_temp_classifier")]
    pub temperature_classifier: f32,
    #[serde(default = "d_temp_step")]
    pub temperature_step: f32,
    #[serde(default = "d_max_tokens_classifier")]
    pub max_tokens_classifier: u32,
    #[serde(default = "d_max_tokens_step")]
    pub max_tokens_step: u32,
    /// LLM calls allowed per conversation per minute.
    #[serde(default = "d_calls_per_min")]
    pub calls_per_min_per_conversation: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key: None,
            model_classifier: d_model_classifier(),
            model_step: d_model_step(),
            timeout_ms: d_timeout_ms(),
            temperature_classifier: d_temp_classifier(),
            temperature_step: d_temp_step(),
            max_tokens_classifier: d_max_tokens_classifier(),
            max_tokens_step: d_max_tokens_step(),
            calls_per_min_per_conversation: d_calls_per_min(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_str("LLM_BASE_URL", &d_base_url()),
            api_key: env_opt("LLM_API_KEY"),
            model_classifier: env_str("LLM_MODEL_CLASSIFIER", &d_model_classifier()),
            model_step: env_str("LLM_MODEL_STEP", &d_model_step()),
            timeout_ms: env_parse("LLM_TIMEOUT_MS", d_timeout_ms()),
            temperature_classifier: env_parse("LLM_TEMPERATURE_CLASSIFIER", d_temp_classifier()),
            temperature_step: env_parse("LLM_TEMPERATURE_STEP", d_temp_step()),
            max_tokens_classifier: env_parse("LLM_MAX_TOKENS_CLASSIFIER", d_max_tokens_classifier()),
            max_tokens_step: env_parse("LLM_MAX_TOKENS_STEP", d_max_tokens_step()),
            calls_per_min_per_conversation: env_parse(
                "LLM_CALLS_PER_MIN_PER_CONVERSATION",
                d_calls_per_min(),
            ),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model_classifier() -> String {
    "gpt-4o-mini".into()
}
fn d_model_step() -> String {
    "gpt-4o-mini".into()
}
fn d_timeout_ms() -> u64 {
    12_000
}
fn d_temp_classifier() -> f32 {
    0.2
}
fn d_temp_step() -> f32 {
    0.3
}
fn d_max_tokens_classifier() -> u32 {
    450
}
fn d_max_tokens_step() -> u32 {
    900
}
fn d_calls_per_min() -> u32 {
    3
}
