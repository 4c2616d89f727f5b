//! Maps handler failures to session-level actions.

use tether_core::HandlerError;

/// What the session does with a failed handler result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Cancel the session token. No reply is sent.
    TerminateSession,
    /// Send one error reply referencing the message; keep the session open.
    ReplyError,
}

/// Classify a handler error.
pub fn classify(err: &HandlerError) -> Classification {
    match err {
        HandlerError::Suspended => Classification::TerminateSession,
        HandlerError::InvalidArgs { .. }
        | HandlerError::NotRunning
        | HandlerError::Transport(_)
        | HandlerError::Internal(_) => Classification::ReplyError,
    }
}
