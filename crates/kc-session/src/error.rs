//! Session error types.

use thiserror::Error;

/// Errors that can occur when building or validating session entities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Session entity violates an invariant.
    #[error("Session invalid: {0}")]
    Invalid(String),

    /// Client session not found within user session.
    #[error("Client session not found for client: {0}")]
    ClientSessionNotFound(String),
}

impl SessionError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ClientSessionNotFound(_))
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
