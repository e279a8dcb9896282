//! Parsed, validated pipeline results.
//!
//! These deserialize from documents that already passed the schemas in
//! [`crate::schema`], so the serde shapes mirror them field for field.

use serde::Deserialize;

use tb_domain::conversation::{Emotion, Intent, RiskLevel};

/// Classifier stage output.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierResult {
    pub intent: Intent,
    pub needs_clarification: bool,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub suggested_next_ask: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub suggest_modes: SuggestModes,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestModes {
    #[serde(default)]
    pub ask_interaction_mode: bool,
    #[serde(default)]
    pub ask_learning_depth: bool,
    #[serde(default)]
    pub ask_executor_role: bool,
    #[serde(default)]
    pub activate_advisory_mode: bool,
}

impl ClassifierResult {
    /// Deterministic substitute on timeout or schema failure.
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Unknown,
            needs_clarification: true,
            missing: vec!["device_type".into()],
            suggested_next_ask: Some("ASK_DEVICE_CATEGORY".into()),
            risk_level: RiskLevel::Low,
            suggest_modes: SuggestModes::default(),
            confidence: 0.0,
        }
    }
}

/// Step-generator stage output, before the button contract is enforced.
#[derive(Debug, Clone, Deserialize)]
pub struct StepResult {
    pub reply: String,
    #[serde(default)]
    pub buttons: Vec<RawButton>,
    #[serde(default)]
    pub emotion: Emotion,
}

/// A button exactly as the model suggested it; tokens are still free-form
/// strings here and get checked against the stage allow-list downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct RawButton {
    pub token: String,
    pub label: String,
    #[serde(default)]
    pub order: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_matches_contract() {
        let fb = ClassifierResult::fallback();
        assert_eq!(fb.intent, Intent::Unknown);
        assert!(fb.needs_clarification);
        assert_eq!(fb.missing, vec!["device_type".to_string()]);
        assert_eq!(fb.suggested_next_ask.as_deref(), Some("ASK_DEVICE_CATEGORY"));
        assert_eq!(fb.risk_level, RiskLevel::Low);
        assert_eq!(fb.confidence, 0.0);
    }

    #[test]
    fn step_result_deserializes_with_defaults() {
        let parsed: StepResult =
            serde_json::from_value(serde_json::json!({ "reply": "Reiniciá el módem." })).unwrap();
        assert!(parsed.buttons.is_empty());
        assert_eq!(parsed.emotion, Emotion::Neutral);
    }
}
