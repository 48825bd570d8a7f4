use std::fmt::Display;
use thiserror::Error;

/// Errors surfaced by [`crate::monitor::Monitor`] operations.
///
/// `NotFound` and `InvalidInput` are the caller's problem; the remaining
/// variants mean the server side could not complete the request.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MonitorError {
    pub fn not_found(kind: &'static str, id: impl Display) -> Self {
        MonitorError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        MonitorError::InvalidInput(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MonitorError::NotFound { .. } | MonitorError::InvalidInput(_)
        )
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
