//! Error types for revealpoll

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    // === Backend Errors ===
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend rejected write: {0}")]
    BackendWriteRejected(String),

    // === Coordinator Errors ===
    #[error("Coordinator not initialized")]
    NotInitialized,

    #[error("Invalid vote option: {0}")]
    InvalidOption(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::BackendUnavailable(_))
    }

    /// Should the coordinator give up on the remote store after this error?
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_) | Error::Timeout(_))
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::BackendWriteRejected(_) => StatusCode::CONFLICT,
            Error::InvalidOption(_) | Error::InvalidConfig(_) | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_decode() {
            Error::Other(format!("malformed response: {}", e))
        } else {
            Error::BackendUnavailable(e.to_string())
        }
    }
}
