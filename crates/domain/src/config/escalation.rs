use serde::{Deserialize, Serialize};

use super::env_str;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Escalation / ticketing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EscalationConfig {
    /// E.164 number of the human support channel (no `+`).
    #[serde(default)]
    pub contact_number: String,
    /// Deep-link base, e.g. `https://wa.me/`.
    #[serde(default)]
    pub contact_url_base: String,
    /// This backend's public URL; tickets link back into transcripts with it.
    #[serde(default)]
    pub public_base_url: String,
}

impl EscalationConfig {
    pub fn from_env() -> Self {
        Self {
            contact_number: env_str("CONTACT_NUMBER", ""),
            contact_url_base: env_str("CONTACT_URL_BASE", ""),
            public_base_url: env_str("PUBLIC_BASE_URL", ""),
        }
    }
}
