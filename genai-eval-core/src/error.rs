use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(
        "Missing variables in prompt template: {missing:?}. Available dataset columns: {available:?}"
    )]
    Template {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error(
        "Missing required columns for metric `{metric}`: {missing:?}. Available dataset columns: {available:?}"
    )]
    MissingColumns {
        metric: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Multimodal payload error: {0}")]
    Multimodal(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvalError {
    fn from(err: serde_yaml::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for EvalError {
    fn from(err: csv::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

/// Status codes reported by the remote judge and generation services.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JudgeErrorCode {
    Aborted,
    DeadlineExceeded,
    ResourceExhausted,
    ServiceUnavailable,
    Cancelled,
    InvalidArgument,
    PermissionDenied,
    NotFound,
    Internal,
    Unknown,
}

impl JudgeErrorCode {
    /// Transient failures that are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JudgeErrorCode::Aborted
                | JudgeErrorCode::DeadlineExceeded
                | JudgeErrorCode::ResourceExhausted
                | JudgeErrorCode::ServiceUnavailable
                | JudgeErrorCode::Cancelled
        )
    }
}

impl fmt::Display for JudgeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JudgeErrorCode::Aborted => "ABORTED",
            JudgeErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            JudgeErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            JudgeErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            JudgeErrorCode::Cancelled => "CANCELLED",
            JudgeErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            JudgeErrorCode::PermissionDenied => "PERMISSION_DENIED",
            JudgeErrorCode::NotFound => "NOT_FOUND",
            JudgeErrorCode::Internal => "INTERNAL",
            JudgeErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Error returned by a single judge or generation RPC.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct JudgeError {
    pub code: JudgeErrorCode,
    pub message: String,
}

impl JudgeError {
    pub fn new(code: JudgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(JudgeErrorCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(JudgeErrorCode::ServiceUnavailable, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
