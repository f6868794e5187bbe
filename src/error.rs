use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out waiting for API quota: {0}")]
    RateLimitTimeout(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Run cancelled")]
    PoolCancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes the retry policy reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimitTimeout,
    Auth,
    NotFound,
    RateLimited,
    Transient,
    Validation,
    Cancelled,
    Internal,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::RateLimitTimeout(_) => ErrorClass::RateLimitTimeout,
            AppError::Auth(_) => ErrorClass::Auth,
            AppError::NotFound(_) => ErrorClass::NotFound,
            AppError::RateLimited { .. } => ErrorClass::RateLimited,
            AppError::Transient(_) => ErrorClass::Transient,
            AppError::Validation(_) | AppError::Config(_) => ErrorClass::Validation,
            AppError::PoolCancelled => ErrorClass::Cancelled,
            AppError::Http(e) if is_network_failure(e) => ErrorClass::Transient,
            AppError::Serialization(_)
            | AppError::Http(_)
            | AppError::Io(_)
            | AppError::Internal(_) => ErrorClass::Internal,
        }
    }
}

/// Failures of the transport itself (connect, reset mid-request, truncated body)
/// rather than of the request we sent.
fn is_network_failure(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if is_network_failure(&e) {
            AppError::Transient(e.to_string())
        } else {
            AppError::Http(e)
        }
    }
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        match e {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                let message = source.message.clone();
                match status {
                    401 | 403 => AppError::Auth(message),
                    404 => AppError::NotFound(message),
                    429 => AppError::RateLimited {
                        message,
                        retry_after: None,
                    },
                    500..=599 => AppError::Transient(message),
                    _ => AppError::Validation(format!("GitHub returned {status}: {message}")),
                }
            }
            other => AppError::Transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
