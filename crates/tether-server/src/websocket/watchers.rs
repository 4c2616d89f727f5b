//! Per-session background tasks tied to the session token.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error};

use super::transport::FrameWriter;

/// Close the connection once the session token is cancelled.
///
/// This is the only place a session closes its connection. Close failures are
/// logged and swallowed.
pub(crate) fn spawn_connection_closer(
    token: CancellationToken,
    writer: Arc<dyn FrameWriter>,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            token.cancelled().await;
            debug!("closing websocket connection");
            if let Err(e) = writer.close().await {
                error!(error = %e, "failed to close websocket connection");
            }
        }
        .in_current_span(),
    )
}

/// Cancel the session when the resource is deleted.
///
/// Exits quietly if the session ends first.
pub(crate) fn spawn_lifecycle_watcher(
    token: CancellationToken,
    deletion: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = deletion.cancelled() => {
                    debug!("resource deleted, cancelling session");
                    token.cancel();
                }
            }
        }
        .in_current_span(),
    )
}
