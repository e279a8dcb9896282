//! Uniform wire errors:
//! `{ok: false, error_code, error_message, request_id}` with a closed code
//! enum. Raw internal detail never crosses this boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tb_domain::{Error, ErrorCode};

pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Map a domain error onto the wire contract.
    ///
    /// 4xx carry the error's own message; 5xx stay opaque (full context
    /// goes to the logs, not the widget).
    pub fn from_domain(err: &Error, request_id: &str) -> Self {
        let code = err.code();
        let (status, message, retry_after_secs) = match err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string(), None),
            Error::Conflict(_) => (StatusCode::CONFLICT, err.to_string(), None),
            Error::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string(), None),
            Error::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests, slow down".to_string(),
                Some(60),
            ),
            Error::LockBusy(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "conversation is busy, retry shortly".to_string(),
                Some(2),
            ),
            Error::LlmTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "assistant timed out".to_string(),
                None,
            ),
            Error::LlmInvalidJson | Error::LlmSchema(_) => (
                StatusCode::BAD_GATEWAY,
                "assistant returned an unusable answer".to_string(),
                None,
            ),
            other => {
                tracing::error!(error = %other, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string(), None)
            }
        };
        Self {
            status,
            code,
            message,
            request_id: request_id.to_string(),
            retry_after_secs,
        }
    }

    pub fn validation(message: impl Into<String>, request_id: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorCode::ValidationFailed,
            message: message.into(),
            request_id: request_id.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>, request_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: ErrorCode::NotFound,
            message: message.into(),
            request_id: request_id.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(request_id: &str) -> Self {
        Self::from_domain(&Error::RateLimited, request_id)
    }

    pub fn unauthorized(request_id: &str) -> Self {
        Self::from_domain(&Error::Unauthorized, request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "ok": false,
            "error_code": self.code.as_str(),
            "error_message": self.message,
            "request_id": self.request_id,
        }));
        let mut resp = (self.status, body).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                resp.headers_mut().insert("Retry-After", value);
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::LockBusy("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::LlmTimeout(12_000), StatusCode::GATEWAY_TIMEOUT),
            (Error::IdExhausted, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from_domain(&err, "r1").status, status);
        }
    }

    #[test]
    fn internal_errors_stay_opaque() {
        let api = ApiError::from_domain(&Error::CorruptedRecord("AB1234".into()), "r1");
        assert_eq!(api.message, "internal error");
        assert!(!api.message.contains("AB1234"));
    }
}
