//! # tether-core
//!
//! Foundation types shared by every tether crate:
//!
//! - **Branded IDs**: `SessionId`, `ResourceId`, `ErrorRef` as newtypes for type safety
//! - **Wire messages**: `InboundMessage` / `OutboundMessage` JSON envelopes
//! - **Close codes**: the WebSocket close codes the session layer cares about
//! - **Errors**: `HandlerError`, `TransportError`, `SessionError` via `thiserror`
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod close;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;

pub use close::CloseCode;
pub use errors::{HandlerError, SessionError, TransportError};
pub use ids::{ErrorRef, ResourceId, SessionId};
pub use messages::{InboundMessage, OutboundMessage};
