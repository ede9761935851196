use salesdesk_api::{ApiError, ErrorCategory};
use thiserror::Error;

/// Session-level errors.
///
/// Cloneable so a shared refresh outcome can reach every waiter; store
/// failures are reduced to strings for the same reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no active session")]
    NotLoggedIn,
    #[error("refresh token expired")]
    RefreshExpired,
    #[error("missing permission: {permission}")]
    PermissionDenied { permission: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("persistence error during {operation}: {reason}")]
    Persistence { operation: String, reason: String },
}

impl SessionError {
    pub(crate) fn persistence(operation: &str, e: std::io::Error) -> Self {
        SessionError::Persistence {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
    }

    /// Returns whether this error is potentially transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Api(api) => api.is_retryable(),
            SessionError::Persistence { .. } => true,
            SessionError::NotLoggedIn
            | SessionError::RefreshExpired
            | SessionError::PermissionDenied { .. } => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotLoggedIn
            | SessionError::RefreshExpired
            | SessionError::PermissionDenied { .. } => ErrorCategory::Auth,
            SessionError::Api(api) => api.category(),
            SessionError::Persistence { .. } => ErrorCategory::Internal,
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            SessionError::NotLoggedIn | SessionError::RefreshExpired => {
                Some("Run 'salesdesk login' to start a session".to_string())
            }
            SessionError::PermissionDenied { permission } => Some(format!(
                "This account lacks the {permission} permission; ask an administrator to grant it"
            )),
            SessionError::Api(api) => api.suggestion(),
            SessionError::Persistence { .. } => {
                Some("Check that the session directory is writable".to_string())
            }
        }
    }
}
