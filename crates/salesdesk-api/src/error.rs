//! API errors with structured categories.
//!
//! `ApiError` is deliberately `Clone`: a single refresh outcome is
//! broadcast to every caller waiting on the same single-flight operation,
//! so payloads are plain strings and numbers rather than source errors.

use thiserror::Error;

/// Error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Another session holds the resource.
    Conflict,
    /// The resource (or the lease on it) no longer exists.
    NotFound,
    /// Authentication or authorization failure.
    Auth,
    /// Network or backend failure.
    External,
    /// Client-side failure (bad payloads, bugs).
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Auth => "auth",
            ErrorCategory::External => "external",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by backend calls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("unit is locked by another session ({remaining_seconds}s remaining)")]
    Conflict {
        remaining_seconds: i64,
        message: Option<String>,
    },
    #[error("resource no longer exists")]
    NotFound,
    #[error("not authenticated")]
    Unauthorized,
    #[error("operation not permitted")]
    Forbidden,
    #[error("network error: {message}")]
    Network { message: String },
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("malformed response: {message}")]
    Decode { message: String },
}

impl ApiError {
    /// The HTTP status this error was mapped from, where one exists.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Conflict { .. } => Some(409),
            ApiError::NotFound => Some(404),
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden => Some(403),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network { .. } | ApiError::Decode { .. } => None,
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Conflict { .. } => ErrorCategory::Conflict,
            ApiError::NotFound => ErrorCategory::NotFound,
            ApiError::Unauthorized | ApiError::Forbidden => ErrorCategory::Auth,
            ApiError::Network { .. } | ApiError::Server { .. } => ErrorCategory::External,
            ApiError::Decode { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns whether this error is potentially transient and may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns a helpful suggestion for resolving the error, where one
    /// exists.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ApiError::Conflict {
                remaining_seconds, ..
            } => Some(format!(
                "Another user is editing this unit. Try again in up to {}s or pick a different unit.",
                (*remaining_seconds).max(0)
            )),
            ApiError::NotFound => Some(
                "The lock is gone, most likely expired. Re-enter the edit flow to acquire a fresh one."
                    .to_string(),
            ),
            ApiError::Unauthorized => {
                Some("Session expired or missing. Run 'salesdesk login' and retry.".to_string())
            }
            ApiError::Forbidden => Some(
                "Your account lacks the permission for this operation. Ask an administrator."
                    .to_string(),
            ),
            ApiError::Network { .. } => Some(
                "Could not reach the backend. Check connectivity and SALESDESK_API_URL.".to_string(),
            ),
            ApiError::Server { .. } => Some(
                "The backend failed. Retry shortly; if it persists, check the server logs."
                    .to_string(),
            ),
            ApiError::Decode { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode {
                message: err.to_string(),
            }
        } else {
            ApiError::Network {
                message: err.to_string(),
            }
        }
    }
}
