//! Relays resource events to one session's client.

use std::sync::Arc;

use tether_core::OutboundMessage;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use super::transport::FrameWriter;

/// Forward status and console events until the session token is cancelled.
pub(crate) fn spawn_event_forwarder(
    token: CancellationToken,
    mut events: broadcast::Receiver<OutboundMessage>,
    writer: Arc<dyn FrameWriter>,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                let event = tokio::select! {
                    () = token.cancelled() => return,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        // A peer that stops reading must not hold up teardown.
                        let result = tokio::select! {
                            () = token.cancelled() => return,
                            result = writer.send_message(&event) => result,
                        };
                        if let Err(e) = result {
                            debug!(error = %e, event = %event.event, "failed to forward resource event");
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged = n, "session lagged behind resource events");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
        .in_current_span(),
    )
}
