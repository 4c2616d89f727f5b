//! Error hierarchy for the session layer.
//!
//! - [`HandlerError`]: failures raised while handling one inbound message
//! - [`TransportError`]: failures writing to or closing a connection
//! - [`SessionError`]: failures while setting a session up
//!
//! Only [`HandlerError::Suspended`] is allowed to end a session from inside
//! message handling; everything else is reported back to the client.

use thiserror::Error;

use crate::ids::SessionId;

/// Failure writing to, or closing, a duplex connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection has already been closed locally or by the peer.
    #[error("connection closed")]
    Closed,
    /// The underlying socket failed.
    #[error("transport failure: {0}")]
    Io(String),
    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure raised by a message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The resource is suspended. Terminates the session.
    #[error("server is suspended")]
    Suspended,
    /// The message carried missing or malformed arguments.
    #[error("invalid arguments for '{event}': {message}")]
    InvalidArgs {
        /// Event the arguments belonged to.
        event: String,
        /// What was wrong with them.
        message: String,
    },
    /// The action requires the resource to be running.
    #[error("server must be running to perform this action")]
    NotRunning,
    /// Writing a reply to the client failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Any other internal failure.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Build an [`HandlerError::InvalidArgs`].
    #[must_use]
    pub fn invalid_args(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Whether the error text may be shown to the client verbatim.
    ///
    /// Internal and transport failures are replaced by a generic message and
    /// an [`ErrorRef`](crate::ids::ErrorRef) in error replies.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::Suspended | Self::InvalidArgs { .. } | Self::NotRunning
        )
    }

    /// Short machine-readable label, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Suspended => "suspended",
            Self::InvalidArgs { .. } => "invalid_args",
            Self::NotRunning => "not_running",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }
}

/// Failure while opening a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session with this id is already registered on the resource.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),
    /// The connection failed during setup.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn suspended_display() {
        assert_eq!(HandlerError::Suspended.to_string(), "server is suspended");
    }

    #[test]
    fn invalid_args_display() {
        let err = HandlerError::invalid_args("set state", "unknown action 'jump'");
        assert_eq!(
            err.to_string(),
            "invalid arguments for 'set state': unknown action 'jump'"
        );
    }

    #[test]
    fn public_errors() {
        assert!(HandlerError::Suspended.is_public());
        assert!(HandlerError::NotRunning.is_public());
        assert!(HandlerError::invalid_args("x", "y").is_public());
        assert!(!HandlerError::Internal("db exploded".into()).is_public());
        assert!(!HandlerError::Transport(TransportError::Closed).is_public());
    }

    #[test]
    fn transport_error_converts() {
        let err: HandlerError = TransportError::Closed.into();
        assert_matches!(err, HandlerError::Transport(TransportError::Closed));
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn kinds_are_snake_case() {
        let errs = [
            HandlerError::Suspended,
            HandlerError::invalid_args("a", "b"),
            HandlerError::NotRunning,
            HandlerError::Transport(TransportError::Io("reset".into())),
            HandlerError::Internal("boom".into()),
        ];
        for err in errs {
            assert!(err.kind().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn duplicate_session_display() {
        let err = SessionError::DuplicateSession(SessionId::from("s-1"));
        assert_eq!(err.to_string(), "session s-1 is already registered");
    }
}
