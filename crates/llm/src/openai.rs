//! OpenAI-compatible adapter.
//!
//! Works with OpenAI and any endpoint that follows the chat-completions
//! contract (Azure gateways, vLLM, Ollama). Only the non-streaming subset
//! is used: both pipeline stages want one JSON document back.

use serde_json::Value;

use tb_domain::config::LlmConfig;
use tb_domain::{Error, Result};

use crate::client::{ChatModel, CompletionRequest};

pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build the client, or `None` when no API key is configured (the
    /// pipeline then answers from deterministic fallbacks).
    pub fn from_config(cfg: &LlmConfig) -> Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        // The transport timeout sits above the gateway's race so the
        // gateway deadline is always the one that fires.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms + 3_000))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Some(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }))
    }

    fn build_body(req: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": req.prompt }));

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&req);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let snippet: String = detail.chars().take(200).collect();
            return Err(Error::Http(format!("provider returned {status}: {snippet}")));
        }

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("provider body: {e}")))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Http("provider response missing message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_json_mode_and_system() {
        let req = CompletionRequest {
            model: "gpt-4o-mini".into(),
            system: Some("you classify support requests".into()),
            prompt: "no tengo internet".into(),
            temperature: 0.2,
            max_tokens: 450,
            json_mode: true,
        };
        let body = OpenAiCompatClient::build_body(&req);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn missing_key_disables_the_client() {
        let cfg = LlmConfig::default();
        assert!(OpenAiCompatClient::from_config(&cfg).unwrap().is_none());
    }
}
