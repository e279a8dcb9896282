//! The LLM gateway: the single place that performs timeout, retry, JSON
//! parsing, and schema validation for both pipeline stages.
//!
//! Handlers never retry on their own. A call either returns a validated
//! JSON document or a typed error the caller answers with a deterministic
//! fallback, and every call leaves an audit trail of transcript-ready
//! system events (payload summaries are sanitized; raw bodies are stored
//! only as SHA-256 digests).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

use tb_domain::config::LlmConfig;
use tb_domain::conversation::SystemEventName;
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

use crate::client::{CallKind, ChatModel, CompletionRequest};
use crate::schema::Schema;

/// Ordered system events produced by one gateway call, ready to append to
/// the conversation transcript.
pub type CallEvents = Vec<(SystemEventName, Value)>;

pub struct LlmGateway {
    client: Option<Arc<dyn ChatModel>>,
    cfg: LlmConfig,
}

impl LlmGateway {
    pub fn new(client: Option<Arc<dyn ChatModel>>, cfg: LlmConfig) -> Self {
        Self { client, cfg }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Run one pipeline call: race the provider against the hard timeout,
    /// retry once on a non-timeout transport error, parse, validate.
    ///
    /// `events` receives the audit trail in order: `IA_CALL_START`,
    /// `IA_CALL_PAYLOAD_SUMMARY`, `IA_CALL_RESULT_RAW` (hashed), and
    /// `IA_CALL_VALIDATION_FAIL` when parsing or validation rejects. The
    /// caller appends its own terminal typed result event after decoding.
    pub async fn call(
        &self,
        kind: CallKind,
        prompt: &str,
        schema: &Schema,
        events: &mut CallEvents,
    ) -> Result<Value> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Http("no LLM client configured".into()))?;

        let (model, temperature, max_tokens) = match kind {
            CallKind::Classifier => (
                self.cfg.model_classifier.clone(),
                self.cfg.temperature_classifier,
                self.cfg.max_tokens_classifier,
            ),
            CallKind::Step => (
                self.cfg.model_step.clone(),
                self.cfg.temperature_step,
                self.cfg.max_tokens_step,
            ),
        };

        events.push((
            SystemEventName::IaCallStart,
            serde_json::json!({ "kind": kind.as_str(), "model": model }),
        ));
        // Summary only: prompt size, never the prompt itself (it may carry
        // the user's name and problem description).
        events.push((
            SystemEventName::IaCallPayloadSummary,
            serde_json::json!({ "kind": kind.as_str(), "prompt_chars": prompt.chars().count() }),
        ));

        let req = CompletionRequest {
            model: model.clone(),
            system: None,
            prompt: prompt.to_string(),
            temperature,
            max_tokens,
            json_mode: true,
        };

        let started = std::time::Instant::now();
        let outcome = self.call_with_retry(client.as_ref(), req).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let raw = match outcome {
            Ok(raw) => raw,
            Err(e) => {
                TraceEvent::LlmCall {
                    kind: kind.as_str().into(),
                    model,
                    duration_ms,
                    outcome: "transport_error".into(),
                }
                .emit();
                return Err(e);
            }
        };

        let hash = hex::encode(Sha256::digest(raw.as_bytes()));
        events.push((
            SystemEventName::IaCallResultRaw,
            serde_json::json!({ "kind": kind.as_str(), "sha256": hash }),
        ));

        let Some(value) = parse_json_lenient(&raw) else {
            events.push((
                SystemEventName::IaCallValidationFail,
                serde_json::json!({ "kind": kind.as_str(), "reason": "invalid_json" }),
            ));
            TraceEvent::LlmCall {
                kind: kind.as_str().into(),
                model,
                duration_ms,
                outcome: "invalid_json".into(),
            }
            .emit();
            return Err(Error::LlmInvalidJson);
        };

        if let Err(reason) = schema.validate(&value) {
            events.push((
                SystemEventName::IaCallValidationFail,
                serde_json::json!({ "kind": kind.as_str(), "reason": reason }),
            ));
            TraceEvent::LlmCall {
                kind: kind.as_str().into(),
                model,
                duration_ms,
                outcome: "schema_fail".into(),
            }
            .emit();
            return Err(Error::LlmSchema(reason));
        }

        TraceEvent::LlmCall {
            kind: kind.as_str().into(),
            model,
            duration_ms,
            outcome: "ok".into(),
        }
        .emit();

        Ok(value)
    }

    /// Timeout is terminal; a transport error earns exactly one retry
    /// after a short jittered backoff.
    async fn call_with_retry(
        &self,
        client: &dyn ChatModel,
        req: CompletionRequest,
    ) -> Result<String> {
        let budget = Duration::from_millis(self.cfg.timeout_ms);

        match tokio::time::timeout(budget, client.complete(req.clone())).await {
            Err(_) => Err(Error::LlmTimeout(self.cfg.timeout_ms)),
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(first)) => {
                tracing::warn!(error = %first, "LLM transport error, retrying once");
                let jitter = rand::thread_rng().gen_range(50..200);
                tokio::time::sleep(Duration::from_millis(jitter)).await;

                match tokio::time::timeout(budget, client.complete(req)).await {
                    Err(_) => Err(Error::LlmTimeout(self.cfg.timeout_ms)),
                    Ok(result) => result,
                }
            }
        }
    }
}

/// Parse a model response that should be JSON but may arrive wrapped in
/// markdown fences or prose.
fn parse_json_lenient(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }

    // Strip ```json ... ``` fences.
    if let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
    {
        if let Ok(v) = serde_json::from_str(inner.trim()) {
            return Some(v);
        }
    }

    // Last resort: the outermost brace pair.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CLASSIFIER_SCHEMA;
    use std::sync::Mutex;

    /// Scripted mock: pops one canned response per call.
    struct ScriptedModel {
        responses: Mutex<Vec<Result<String>>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                delay: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _req: CompletionRequest) -> Result<String> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::Http("script exhausted".into()));
            }
            responses.remove(0)
        }
    }

    fn gateway(model: ScriptedModel, timeout_ms: u64) -> LlmGateway {
        let cfg = LlmConfig {
            timeout_ms,
            ..LlmConfig::default()
        };
        LlmGateway::new(Some(Arc::new(model)), cfg)
    }

    fn classifier_json() -> String {
        serde_json::json!({
            "intent": "network",
            "needs_clarification": false,
            "risk_level": "low",
            "confidence": 0.9
        })
        .to_string()
    }

    #[tokio::test]
    async fn valid_call_emits_start_summary_and_hash() {
        let gw = gateway(ScriptedModel::new(vec![Ok(classifier_json())]), 5_000);
        let mut events = CallEvents::new();
        let value = gw
            .call(CallKind::Classifier, "prompt", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap();

        assert_eq!(value["intent"], "network");
        let names: Vec<_> = events.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                SystemEventName::IaCallStart,
                SystemEventName::IaCallPayloadSummary,
                SystemEventName::IaCallResultRaw,
            ]
        );
        // Raw output is hashed, never stored verbatim.
        let hash = events[2].1["sha256"].as_str().unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[tokio::test]
    async fn timeout_is_terminal() {
        let mut model = ScriptedModel::new(vec![Ok(classifier_json())]);
        model.delay = Some(Duration::from_millis(200));
        let gw = gateway(model, 10);

        let mut events = CallEvents::new();
        let err = gw
            .call(CallKind::Classifier, "p", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LlmTimeout(10)));
    }

    #[tokio::test]
    async fn transport_error_is_retried_once() {
        let gw = gateway(
            ScriptedModel::new(vec![
                Err(Error::Http("connection reset".into())),
                Ok(classifier_json()),
            ]),
            5_000,
        );
        let mut events = CallEvents::new();
        let value = gw
            .call(CallKind::Classifier, "p", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap();
        assert_eq!(value["intent"], "network");
    }

    #[tokio::test]
    async fn second_transport_error_surfaces() {
        let gw = gateway(
            ScriptedModel::new(vec![
                Err(Error::Http("reset".into())),
                Err(Error::Http("reset again".into())),
            ]),
            5_000,
        );
        let mut events = CallEvents::new();
        let err = gw
            .call(CallKind::Classifier, "p", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[tokio::test]
    async fn non_json_body_flags_validation_fail() {
        let gw = gateway(
            ScriptedModel::new(vec![Ok("I think the intent is network!".into())]),
            5_000,
        );
        let mut events = CallEvents::new();
        let err = gw
            .call(CallKind::Classifier, "p", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LlmInvalidJson));
        assert!(events
            .iter()
            .any(|(n, _)| *n == SystemEventName::IaCallValidationFail));
    }

    #[tokio::test]
    async fn schema_violation_flags_validation_fail() {
        let gw = gateway(
            ScriptedModel::new(vec![Ok(
                serde_json::json!({ "intent": "network" }).to_string()
            )]),
            5_000,
        );
        let mut events = CallEvents::new();
        let err = gw
            .call(CallKind::Classifier, "p", &CLASSIFIER_SCHEMA, &mut events)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LlmSchema(_)));
    }

    #[test]
    fn lenient_parse_handles_fences_and_prose() {
        let fenced = format!("```json\n{}\n```", classifier_json());
        assert!(parse_json_lenient(&fenced).is_some());

        let prose = format!("Here you go: {} hope it helps", classifier_json());
        assert!(parse_json_lenient(&prose).is_some());

        assert!(parse_json_lenient("no braces here").is_none());
    }
}
