//! Typed API-level errors.
//!
//! Every failure surfaced to a caller carries a stable machine code,
//! a human message, and the mapped HTTP status. Codes are part of the
//! external contract; internal error details never leak past
//! `internal_error`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::contracts::ErrorResponse;

/// A terminal request error with its external mapping.
#[derive(Debug, Clone)]
pub struct AppError {
    pub code: &'static str,
    pub message: String,
    pub status: StatusCode,
}

impl AppError {
    pub fn new(code: &'static str, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            status,
        }
    }

    pub fn internal(err: &anyhow::Error) -> Self {
        Self::new(
            "internal_error",
            format!("internal_error: {err}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    /// The JSON error envelope for this error, tagged with the request id.
    pub fn into_envelope(self, request_id: &str) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
            request_id: request_id.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = AppError::new("rate_limited", "requests_per_minute_exceeded", StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "rate_limited: requests_per_minute_exceeded");
    }

    #[test]
    fn internal_error_mapping() {
        let cause = anyhow::anyhow!("boom");
        let err = AppError::internal(&cause);
        assert_eq!(err.code, "internal_error");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn envelope_carries_status() {
        let err = AppError::new("policy_denied", "blocked_pattern_detected", StatusCode::FORBIDDEN);
        let response = err.into_envelope("req-0011223344556677");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
