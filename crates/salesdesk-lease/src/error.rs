use salesdesk_api::{ApiError, ErrorCategory};
use thiserror::Error;

/// Errors from lease operations.
///
/// `Conflict` keeps the backend's own message when it sent one; desks are
/// used to those exact words.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeaseError {
    #[error("{unit}: {}", .message.clone().unwrap_or_else(|| format!("being edited by another session ({remaining_seconds}s remaining)")))]
    Conflict {
        unit: String,
        remaining_seconds: i64,
        message: Option<String>,
    },

    /// The server no longer knows this lease; renewing is pointless.
    #[error("editing window for {unit} has ended")]
    Gone { unit: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl LeaseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LeaseError::Conflict { .. } => ErrorCategory::Conflict,
            LeaseError::Gone { .. } => ErrorCategory::NotFound,
            LeaseError::Api(e) => e.category(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LeaseError::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            LeaseError::Conflict {
                remaining_seconds, ..
            } => Some(format!(
                "Try again in about {} seconds, or pick another unit",
                (*remaining_seconds).max(0)
            )),
            LeaseError::Gone { .. } => {
                Some("Re-open the unit to start a fresh editing window".to_string())
            }
            LeaseError::Api(e) => e.suggestion(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_prefers_the_backend_message() {
        let err = LeaseError::Conflict {
            unit: "EMP01/B/204".to_string(),
            remaining_seconds: 120,
            message: Some("Unidade em edição por outro usuário".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "EMP01/B/204: Unidade em edição por outro usuário"
        );
    }

    #[test]
    fn test_conflict_falls_back_to_remaining_time() {
        let err = LeaseError::Conflict {
            unit: "EMP01/B/204".to_string(),
            remaining_seconds: 45,
            message: None,
        };
        assert_eq!(
            err.to_string(),
            "EMP01/B/204: being edited by another session (45s remaining)"
        );
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_api_errors_pass_through() {
        let err = LeaseError::from(ApiError::Network {
            message: "timed out".to_string(),
        });
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::External);
    }
}
