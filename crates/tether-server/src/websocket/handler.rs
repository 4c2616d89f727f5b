//! Inbound message handling.
//!
//! The read loop hands each decoded [`InboundMessage`] to a [`MessageHandler`]
//! on its own task. Handlers talk back through the [`SessionContext`].

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::messages::{
    CONSOLE_OUTPUT, SEND_COMMAND, SEND_LOGS, SEND_STATS, SET_STATE, STATS,
};
use tether_core::{HandlerError, InboundMessage, OutboundMessage, SessionId, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::transport::FrameWriter;
use crate::resource::{PowerAction, Resource};

/// Everything a handler needs from the session it serves.
#[derive(Clone)]
pub struct SessionContext {
    session_id: SessionId,
    token: CancellationToken,
    resource: Arc<Resource>,
    writer: Arc<dyn FrameWriter>,
}

impl SessionContext {
    /// Bundle a session's id, token, resource and writer.
    pub fn new(
        session_id: SessionId,
        token: CancellationToken,
        resource: Arc<Resource>,
        writer: Arc<dyn FrameWriter>,
    ) -> Self {
        Self {
            session_id,
            token,
            resource,
            writer,
        }
    }

    /// Id of the session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The session token. Cancelling it ends the session.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The resource the session is attached to.
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Whether the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Send a message to this session's client.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.writer.send_message(message).await
    }
}

/// Handles one inbound message for one session.
///
/// Returning [`HandlerError::Suspended`] ends the session; any other error is
/// reported back to the client and the session continues.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    async fn handle(
        &self,
        session: &SessionContext,
        message: &InboundMessage,
    ) -> Result<(), HandlerError>;
}

/// Default handler: console input, power actions, log replay and stats.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceEventHandler;

#[async_trait]
impl MessageHandler for ResourceEventHandler {
    async fn handle(
        &self,
        session: &SessionContext,
        message: &InboundMessage,
    ) -> Result<(), HandlerError> {
        if session.is_cancelled() {
            trace!(event = %message.event, "session cancelled, ignoring message");
            return Ok(());
        }
        let resource = session.resource();

        match message.event.as_str() {
            SEND_COMMAND => {
                let line = required_arg(message)?;
                resource.send_command(line)
            }
            SET_STATE => {
                let action: PowerAction = required_arg(message)?
                    .parse()
                    .map_err(|e: String| HandlerError::invalid_args(SET_STATE, e))?;
                // The resulting status reaches every session through the resource's events.
                let _ = resource.power(action)?;
                Ok(())
            }
            SEND_LOGS => {
                for line in resource.backlog(usize::MAX) {
                    session
                        .send(&OutboundMessage::event(CONSOLE_OUTPUT, vec![line]))
                        .await?;
                }
                Ok(())
            }
            SEND_STATS => {
                let stats = serde_json::to_string(&resource.snapshot())
                    .map_err(|e| HandlerError::Internal(format!("failed to encode stats: {e}")))?;
                session.send(&OutboundMessage::event(STATS, vec![stats])).await?;
                Ok(())
            }
            other => {
                debug!(event = other, "ignoring unknown event");
                Ok(())
            }
        }
    }
}

fn required_arg(message: &InboundMessage) -> Result<&str, HandlerError> {
    message
        .first_arg()
        .ok_or_else(|| HandlerError::invalid_args(message.event.as_str(), "missing argument"))
}
