//! Error taxonomy for session operations.
//!
//! No error here is fatal: each one is turned into an `error` or `warning` event for the
//! requesting connection and the session keeps running for everybody else.

use shared::{ServerEvent, SessionId, UserId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    /// Carries the user who was turned away
    #[error("Session is full, {0} was not admitted")]
    Full(UserId),
    #[error("Content unavailable: {0}")]
    Content(String),
    #[error("Session closed: {0}")]
    Closed(SessionId),
    #[error("Unknown action: {0}")]
    Unsupported(String),
}

impl SessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SessionError::InvalidState(message.into())
    }

    /// Invalid-state conditions are surfaced as warnings, everything else as errors.
    pub fn is_warning(&self) -> bool {
        matches!(self, SessionError::InvalidState(_))
    }

    pub fn to_event(&self) -> ServerEvent {
        match self {
            SessionError::Full(_) => ServerEvent::error("Session is full"),
            err if err.is_warning() => ServerEvent::warning(err.to_string()),
            err => ServerEvent::error(err.to_string()),
        }
    }
}
