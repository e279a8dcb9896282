use serde::{Deserialize, Serialize};

use super::{env_opt, env_parse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialogue flow thresholds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// `BTN_PERSIST` presses tolerated inside one diagnostic stage before
    /// handing over to a human.
    #[serde(default = "d_attempts")]
    pub diagnostic_attempts_threshold: u32,
    /// Consecutive clarification failures tolerated before escalation.
    #[serde(default = "d_clarifications")]
    pub clarification_failures_threshold: u32,
    /// Classifier confidence below this (strict) activates the guided story.
    #[serde(default = "d_confidence")]
    pub guided_story_confidence: f64,
    /// Bot steps replayed into the step-generator prompt.
    #[serde(default = "d_history")]
    pub history_steps: usize,
    /// Reply length ceiling after sanitization (chars).
    #[serde(default = "d_reply_max")]
    pub reply_max_chars: usize,
    /// Domains whose links survive reply sanitization.
    #[serde(default = "d_link_domains")]
    pub link_allow_domains: Vec<String>,
    /// Retries per connectivity step before escalation.
    #[serde(default = "d_connectivity_retries")]
    pub connectivity_retry_limit: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            diagnostic_attempts_threshold: d_attempts(),
            clarification_failures_threshold: d_clarifications(),
            guided_story_confidence: d_confidence(),
            history_steps: d_history(),
            reply_max_chars: d_reply_max(),
            link_allow_domains: d_link_domains(),
            connectivity_retry_limit: d_connectivity_retries(),
        }
    }
}

impl FlowConfig {
    pub fn from_env() -> Self {
        Self {
            diagnostic_attempts_threshold: env_parse(
                "DIAGNOSTIC_ATTEMPTS_THRESHOLD",
                d_attempts(),
            ),
            clarification_failures_threshold: env_parse(
                "CLARIFICATION_FAILURES_THRESHOLD",
                d_clarifications(),
            ),
            guided_story_confidence: env_parse("GUIDED_STORY_CONFIDENCE", d_confidence()),
            history_steps: env_parse("HISTORY_STEPS", d_history()),
            reply_max_chars: env_parse("REPLY_MAX_CHARS", d_reply_max()),
            link_allow_domains: env_opt("LINK_ALLOW_DOMAINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(d_link_domains),
            connectivity_retry_limit: env_parse(
                "CONNECTIVITY_RETRY_LIMIT",
                d_connectivity_retries(),
            ),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_attempts() -> u32 {
    2
}
fn d_clarifications() -> u32 {
    3
}
fn d_confidence() -> f64 {
    0.3
}
fn d_history() -> usize {
    3
}
fn d_reply_max() -> usize {
    1_200
}
fn d_link_domains() -> Vec<String> {
    vec!["example.com".into(), "wa.me".into()]
}
fn d_connectivity_retries() -> u32 {
    2
}
