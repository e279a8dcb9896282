mod escalation;
mod flow;
mod llm;
mod server;
mod storage;

pub use escalation::*;
pub use flow::*;
pub use llm::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Full backend configuration.
///
/// Populated once at startup from the environment and passed down as an
/// `Arc<Config>`; no component reads env vars on its own after boot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

impl Config {
    /// Read the whole configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            storage: StorageConfig::from_env(),
            llm: LlmConfig::from_env(),
            escalation: EscalationConfig::from_env(),
            flow: FlowConfig::from_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warn(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(err("PORT", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(err("HOST", "host must not be empty"));
        }
        if self.server.allowed_origins.is_empty() {
            errors.push(warn("ALLOWED_ORIGINS", "empty allow-list blocks all browser clients"));
        }
        if self.server.admin_token.as_deref().unwrap_or("").is_empty() {
            errors.push(err("ADMIN_TOKEN", "required to protect /trace and /historial"));
        }

        if self.llm.api_key.as_deref().unwrap_or("").is_empty() {
            errors.push(warn(
                "LLM_API_KEY",
                "not set: classifier and step stages will answer with deterministic fallbacks",
            ));
        }
        if self.llm.timeout_ms == 0 {
            errors.push(err("LLM_TIMEOUT_MS", "timeout must be greater than 0"));
        }

        if self.escalation.contact_number.is_empty() {
            errors.push(err("CONTACT_NUMBER", "required for the escalation deep-link"));
        }
        if self.escalation.contact_url_base.is_empty() {
            errors.push(err("CONTACT_URL_BASE", "required for the escalation deep-link"));
        }
        if self.escalation.public_base_url.is_empty() {
            errors.push(err("PUBLIC_BASE_URL", "required to link tickets back to transcripts"));
        }

        if self.storage.cache_capacity == 0 {
            errors.push(warn("CACHE_CAPACITY", "0 disables the session cache; using 1"));
        }
        if self.flow.diagnostic_attempts_threshold == 0 {
            errors.push(err(
                "DIAGNOSTIC_ATTEMPTS_THRESHOLD",
                "threshold of 0 would escalate before the first diagnostic step",
            ));
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env helpers (shared by the sub-config from_env impls)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn env_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.server.admin_token = Some("secret".into());
        cfg.llm.api_key = Some("sk-test".into());
        cfg.escalation.contact_number = "5493410000000".into();
        cfg.escalation.contact_url_base = "https://wa.me/".into();
        cfg.escalation.public_base_url = "https://support.example.com".into();
        cfg
    }

    #[test]
    fn valid_config_has_no_errors() {
        let issues = valid_config().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn missing_contact_number_is_an_error() {
        let mut cfg = valid_config();
        cfg.escalation.contact_number.clear();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "CONTACT_NUMBER"));
    }

    #[test]
    fn missing_llm_key_is_only_a_warning() {
        let mut cfg = valid_config();
        cfg.llm.api_key = None;
        let issues = cfg.validate();
        let issue = issues.iter().find(|i| i.field == "LLM_API_KEY").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }
}
