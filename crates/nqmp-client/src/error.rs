//! Error types for nqmp-client

use thiserror::Error;

/// HTTP status codes that indicate a retryable service condition.
pub const TRANSIENT_STATUS_CODES: [u16; 4] = [408, 409, 425, 429];

/// Return true if an HTTP status suggests a transient failure.
///
/// Request timeout, conflict, too-early, rate limiting and every 5xx.
pub fn is_transient_status(code: u16) -> bool {
    TRANSIENT_STATUS_CODES.contains(&code) || (500..600).contains(&code)
}

/// Failure of a single call against the answering service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Retryable: timeouts, connection resets, rate limiting, 5xx.
    #[error("transient service error (status {code:?}): {message}")]
    Transient { code: Option<u16>, message: String },

    /// Non-retryable: auth failures, bad requests, malformed payloads.
    #[error("fatal service error (status {code:?}): {message}")]
    Fatal { code: Option<u16>, message: String },
}

impl ServiceError {
    /// Classify an HTTP status into the matching error class.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if is_transient_status(code) {
            ServiceError::Transient {
                code: Some(code),
                message,
            }
        } else {
            ServiceError::Fatal {
                code: Some(code),
                message,
            }
        }
    }

    /// Whether the harness may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient { .. })
    }

    /// HTTP status code, when the failure carried one.
    pub fn code(&self) -> Option<u16> {
        match self {
            ServiceError::Transient { code, .. } | ServiceError::Fatal { code, .. } => *code,
        }
    }

    /// Human-readable message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Transient { message, .. } | ServiceError::Fatal { message, .. } => {
                message
            }
        }
    }
}

/// Errors constructing a client (surface before any request is made).
#[derive(Error, Debug)]
pub enum ClientError {
    /// API key required by the selected client is not configured
    #[error("{0} missing; set it in the environment or .env")]
    MissingApiKey(&'static str),

    /// Unknown client name
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
