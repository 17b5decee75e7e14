use thiserror::Error;
use uuid::Uuid;

use crate::rule::RuleStatus;

#[derive(Error, Debug)]
pub enum L2mError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("cannot {action} a rule in status `{status}`")]
    InvalidTransition {
        action: &'static str,
        status: RuleStatus,
    },

    /// The remote call did not complete; resource state is unknown.
    #[error("backend unreachable during {operation}: {detail}")]
    BackendUnavailable { operation: String, detail: String },

    /// The backend answered and reported failure. Detail is verbatim.
    #[error("backend rejected {operation}: {detail}")]
    BackendRejected { operation: String, detail: String },

    /// The backend answered 2xx but the payload was not the expected shape.
    #[error("unexpected response from {operation}: {detail}")]
    UnexpectedResponse { operation: String, detail: String },

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, L2mError>;

impl L2mError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(operation: impl Into<String>, detail: impl ToString) -> Self {
        Self::BackendUnavailable {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub fn rejected(operation: impl Into<String>, detail: impl ToString) -> Self {
        Self::BackendRejected {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub fn unexpected(operation: impl Into<String>, detail: impl ToString) -> Self {
        Self::UnexpectedResponse {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Transient errors are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}
