use tb_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which of the two pipeline stages a call serves. Each kind has its own
/// model, temperature, token cap, and output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Classifier,
    Step,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Classifier => "classifier",
            CallKind::Step => "step",
        }
    }
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    /// Optional system preamble; the user prompt carries the real payload.
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When `true`, ask the provider for a JSON-only response.
    pub json_mode: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The injected LLM dependency.
///
/// The production implementation is [`crate::openai::OpenAiCompatClient`];
/// tests substitute a scripted mock. Implementations return the raw text
/// body; timeout, retry, parsing, and schema validation all live in
/// [`crate::gateway::LlmGateway`], never here.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String>;
}
