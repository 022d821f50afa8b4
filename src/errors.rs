use serde::Serialize;
use uuid::Uuid;

/// Error taxonomy for the parking operations core.
///
/// The transport layer owns the mapping to wire-level status codes; this
/// crate only distinguishes the categories callers need to react to.
/// `Conflict` and `ConcurrentModification` are deliberately separate:
/// the latter is safe to retry, the former is not.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Whether a caller may safely retry the failed operation verbatim.
    ///
    /// Only optimistic-lock collisions qualify; business-rule conflicts
    /// must not be blindly retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrentModification(_))
    }

    /// Returns the message suitable for callers outside the core.
    /// Internal failures collapse to a generic message.
    pub fn response_message(&self) -> String {
        match self {
            Self::InternalError(_) | Self::EventError(_) => "Internal error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }
}
