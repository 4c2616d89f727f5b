//! JSON message envelopes exchanged over a session.
//!
//! Every frame in either direction is an object with an `event` discriminator
//! and an ordered list of string `args`:
//!
//! ```json
//! {"event": "send command", "args": ["say hello"]}
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::HandlerError;
use crate::ids::ErrorRef;

/// Inbound: write a line to the resource console.
pub const SEND_COMMAND: &str = "send command";
/// Inbound: perform a power action (`start`, `stop`, `restart`, `kill`).
pub const SET_STATE: &str = "set state";
/// Inbound: replay the console backlog.
pub const SEND_LOGS: &str = "send logs";
/// Inbound: request a stats snapshot.
pub const SEND_STATS: &str = "send stats";

/// Outbound: one console line.
pub const CONSOLE_OUTPUT: &str = "console output";
/// Outbound: power state change.
pub const STATUS: &str = "status";
/// Outbound: stats snapshot (single JSON-encoded arg).
pub const STATS: &str = "stats";
/// Outbound: structured error reply for a failed inbound message.
pub const DAEMON_ERROR: &str = "daemon error";

/// Text sent instead of a non-public error message.
pub const GENERIC_ERROR_TEXT: &str =
    "an unexpected error was encountered while handling this request";

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Open-set event discriminator; absent on the wire means empty.
    #[serde(default)]
    pub event: String,
    /// Event arguments; absent on the wire means empty.
    #[serde(default)]
    pub args: Vec<String>,
}

impl InboundMessage {
    /// Create a message.
    pub fn new(event: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Decode a frame payload (text or binary) as JSON.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// First argument, if any.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// An outbound frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event discriminator.
    pub event: String,
    /// Event arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Event of the inbound message this frame answers (error replies only).
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Server-side reference for a withheld error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_ref: Option<ErrorRef>,
}

impl OutboundMessage {
    /// Create an event frame.
    pub fn event(event: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            event: event.into(),
            args,
            in_reply_to: None,
            error_ref: None,
        }
    }

    /// Build the error reply for a failed inbound message.
    ///
    /// Public errors carry their own text. Anything else carries
    /// [`GENERIC_ERROR_TEXT`] and a fresh [`ErrorRef`] that the caller should
    /// log alongside the real error.
    pub fn error_reply(origin: &InboundMessage, err: &HandlerError) -> Self {
        let (text, error_ref) = if err.is_public() {
            (err.to_string(), None)
        } else {
            (GENERIC_ERROR_TEXT.to_owned(), Some(ErrorRef::new()))
        };
        Self {
            event: DAEMON_ERROR.to_owned(),
            args: vec![text],
            in_reply_to: Some(origin.event.clone()),
            error_ref,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
