//! WebSocket session layer.
//!
//! A [`Session`] owns one upgraded connection. Its lifetime is bounded by a
//! cancellation token derived from the HTTP request; cancelling it (client
//! disconnect, resource deletion, a suspended handler result, server shutdown)
//! closes the connection exactly once and deregisters the session.

pub mod classify;
mod forwarder;
pub mod handler;
pub mod memory;
mod reader;
pub mod session;
pub mod transport;
mod watchers;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use classify::{Classification, classify};
pub use handler::{MessageHandler, ResourceEventHandler, SessionContext};
pub use session::{Session, SessionOutcome};
pub use transport::{Frame, FrameReader, FrameWriter, ReadError};
