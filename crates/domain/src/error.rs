use serde::Serialize;

/// Shared error type used across all Tecnibot crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("LLM call timed out after {0} ms")]
    LlmTimeout(u64),

    #[error("LLM returned a non-JSON body")]
    LlmInvalidJson,

    #[error("LLM output rejected by schema: {0}")]
    LlmSchema(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unauthorized")]
    Unauthorized,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("conversation ID space exhausted")]
    IdExhausted,

    #[error("lock busy: {0}")]
    LockBusy(String),

    #[error("record {0} is corrupted")]
    CorruptedRecord(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of machine-readable error codes exposed on the wire.
///
/// Internal detail never leaks through these; the HTTP layer maps each
/// domain [`Error`] to exactly one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    RateLimited,
    NotFound,
    Conflict,
    InternalError,
    Unauthorized,
    PayloadTooLarge,
    LlmTimeout,
    LlmInvalidOutput,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::LlmTimeout => "llm_timeout",
            ErrorCode::LlmInvalidOutput => "llm_invalid_output",
        }
    }
}

impl Error {
    /// Map this error to its wire code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::ValidationFailed,
            Error::RateLimited => ErrorCode::RateLimited,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::Unauthorized => ErrorCode::Unauthorized,
            Error::PayloadTooLarge => ErrorCode::PayloadTooLarge,
            Error::LlmTimeout(_) => ErrorCode::LlmTimeout,
            Error::LlmInvalidJson | Error::LlmSchema(_) => ErrorCode::LlmInvalidOutput,
            _ => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorCode::PayloadTooLarge).unwrap();
        assert_eq!(json, "\"payload_too_large\"");
        assert_eq!(ErrorCode::PayloadTooLarge.as_str(), "payload_too_large");
    }

    #[test]
    fn llm_errors_map_to_llm_codes() {
        assert_eq!(Error::LlmTimeout(12_000).code(), ErrorCode::LlmTimeout);
        assert_eq!(Error::LlmInvalidJson.code(), ErrorCode::LlmInvalidOutput);
        assert_eq!(
            Error::LlmSchema("missing field".into()).code(),
            ErrorCode::LlmInvalidOutput
        );
    }

    #[test]
    fn internal_errors_are_opaque() {
        assert_eq!(Error::IdExhausted.code(), ErrorCode::InternalError);
        assert_eq!(
            Error::CorruptedRecord("AB1234".into()).code(),
            ErrorCode::InternalError
        );
    }
}
