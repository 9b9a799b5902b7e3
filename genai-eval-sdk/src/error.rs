//! SDK error types and handling
//!
//! HTTP failures are classified into the judge status codes the evaluation workflow retries on.

use genai_eval_core::{EvalError, JudgeError, JudgeErrorCode};
use thiserror::Error;

/// The main error type for the SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// API returned an error response
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
        /// Canonical status name from the error body, e.g. `RESOURCE_EXHAUSTED`
        error_status: Option<String>,
    },

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

/// Result type alias for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;

/// Error body returned by the API: `{"error": {"code", "message", "status"}}`
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl SdkError {
    /// Create an API error from a response
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(parsed) => SdkError::ApiError {
                status,
                message: parsed.error.message,
                error_status: parsed.error.status,
            },
            Err(_) => SdkError::ApiError {
                status,
                message: body.trim().to_string(),
                error_status: None,
            },
        }
    }

    /// Judge status code this error corresponds to
    pub fn judge_code(&self) -> JudgeErrorCode {
        match self {
            SdkError::ApiError { status, .. } => code_for_status(*status),
            SdkError::Timeout(_) => JudgeErrorCode::DeadlineExceeded,
            SdkError::NetworkError(e) if e.is_timeout() => JudgeErrorCode::DeadlineExceeded,
            SdkError::NetworkError(e) if e.is_connect() => JudgeErrorCode::ServiceUnavailable,
            SdkError::NetworkError(_) => JudgeErrorCode::Unknown,
            SdkError::SerializationError(_) => JudgeErrorCode::Internal,
            SdkError::ConfigurationError(_) | SdkError::UrlError(_) => {
                JudgeErrorCode::InvalidArgument
            }
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        self.judge_code().is_retryable()
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SdkError::ApiError { status, .. } => Some(*status),
            SdkError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// HTTP status to judge status code.
pub fn code_for_status(status: u16) -> JudgeErrorCode {
    match status {
        400 | 422 => JudgeErrorCode::InvalidArgument,
        401 | 403 => JudgeErrorCode::PermissionDenied,
        404 => JudgeErrorCode::NotFound,
        408 | 504 => JudgeErrorCode::DeadlineExceeded,
        409 => JudgeErrorCode::Aborted,
        429 => JudgeErrorCode::ResourceExhausted,
        499 => JudgeErrorCode::Cancelled,
        503 => JudgeErrorCode::ServiceUnavailable,
        500..=599 => JudgeErrorCode::Internal,
        _ => JudgeErrorCode::Unknown,
    }
}

impl From<SdkError> for JudgeError {
    fn from(err: SdkError) -> Self {
        JudgeError::new(err.judge_code(), err.to_string())
    }
}

impl From<SdkError> for EvalError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::ConfigurationError(message) => EvalError::Configuration(message),
            SdkError::UrlError(e) => EvalError::Configuration(e.to_string()),
            other => EvalError::Judge(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_json_response() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let error = SdkError::from_response(429, body);

        match &error {
            SdkError::ApiError {
                message,
                error_status,
                ..
            } => {
                assert_eq!(message, "Quota exceeded");
                assert_eq!(error_status.as_deref(), Some("RESOURCE_EXHAUSTED"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(error.is_retryable());
    }

    #[test]
    fn test_plain_text_body() {
        let error = SdkError::from_response(502, "  bad gateway \n");
        assert!(matches!(
            error,
            SdkError::ApiError { ref message, .. } if message == "bad gateway"
        ));
        assert_eq!(error.judge_code(), JudgeErrorCode::Internal);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(code_for_status(503), JudgeErrorCode::ServiceUnavailable);
        assert_eq!(code_for_status(504), JudgeErrorCode::DeadlineExceeded);
        assert_eq!(code_for_status(408), JudgeErrorCode::DeadlineExceeded);
        assert_eq!(code_for_status(409), JudgeErrorCode::Aborted);
        assert_eq!(code_for_status(499), JudgeErrorCode::Cancelled);
        assert_eq!(code_for_status(400), JudgeErrorCode::InvalidArgument);
        assert!(!code_for_status(404).is_retryable());
    }

    #[test]
    fn test_conversion_into_eval_error() {
        let err: EvalError = SdkError::from_response(503, "down").into();
        assert!(matches!(err, EvalError::Judge(ref j) if j.is_retryable()));

        let err: EvalError = SdkError::ConfigurationError("no url".to_string()).into();
        assert!(matches!(err, EvalError::Configuration(_)));
    }
}
