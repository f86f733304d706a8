//! Error types for session coordination.
//!
//! Lower layers keep their own typed errors; [`SessionError`] wraps them so
//! the coordinator can decide per failure whether the call fails or carries
//! on.

use std::time::Duration;

use switchboard_media_core::{MediaError, SocketError};
use switchboard_sip_core::{NegotiationError, ParseError};
use thiserror::Error;

use crate::call::{CallEvent, CallState};

/// Result alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// A timer expired before the peer did what the protocol required
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError {
    /// A 2xx to INVITE was never acknowledged
    #[error("No ACK for call {call_id} within {after:?}")]
    Ack { call_id: String, after: Duration },

    /// Nobody answered while the call was ringing
    #[error("No answer for call {call_id} within {after:?}")]
    NoAnswer { call_id: String, after: Duration },

    /// An outgoing request got no final response
    #[error("{method} for call {call_id} timed out after {after:?}")]
    Transaction {
        call_id: String,
        method: String,
        after: Duration,
    },
}

/// Errors surfaced by the session layer
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: String },

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: CallState, event: CallEvent },

    /// A collaborator is missing or refused to handle the call
    #[error("Collaborator {name} failed: {reason}")]
    Collaborator { name: String, reason: String },

    /// The SIP transport could not send or is closed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    pub fn call_not_found(call_id: &str) -> Self {
        SessionError::CallNotFound {
            call_id: call_id.to_string(),
        }
    }

    pub fn collaborator(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::Collaborator {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl std::fmt::Display) -> Self {
        SessionError::Transport(reason.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err: SessionError = ParseError::Incomplete.into();
        assert_eq!(err.to_string(), "Incomplete message: missing header terminator");

        let err: SessionError = TimeoutError::Ack {
            call_id: "c1".into(),
            after: Duration::from_secs(32),
        }
        .into();
        assert!(err.to_string().contains("No ACK for call c1"));
    }

    #[test]
    fn invalid_transition_names_state_and_event() {
        let err = SessionError::InvalidTransition {
            from: CallState::Terminated,
            event: CallEvent::Answer,
        };
        assert_eq!(err.to_string(), "Invalid transition from terminated on answer");
    }
}
