//! LLM access for the two-stage pipeline: the injected [`ChatModel`]
//! provider trait, the OpenAI-compatible adapter, and the [`LlmGateway`]
//! that wraps every call with timeout, single retry, JSON parsing, and
//! data-driven schema validation.

pub mod client;
pub mod gateway;
pub mod openai;
pub mod schema;
pub mod types;

pub use client::{CallKind, ChatModel, CompletionRequest};
pub use gateway::{CallEvents, LlmGateway};
pub use openai::OpenAiCompatClient;
pub use schema::{CLASSIFIER_SCHEMA, STEP_SCHEMA};
pub use types::{ClassifierResult, RawButton, StepResult, SuggestModes};
