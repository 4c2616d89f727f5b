//! Session coordinator: one upgraded connection from registration to teardown.
//!
//! 1. Derives the session token from the request token
//! 2. Registers the session with the resource (deregistered on every exit path)
//! 3. Starts the connection closer, lifecycle watcher and event forwarder
//! 4. Rejects suspended resources with close code 4409
//! 5. Otherwise runs the read loop until the connection fails
//! 6. Cancels the token, deregisters, then waits (bounded) for the background tasks

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tether_core::close::{SUSPENDED_CLOSE_CODE, SUSPENDED_CLOSE_REASON};
use tether_core::{CloseCode, SessionError, SessionId};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::forwarder::spawn_event_forwarder;
use super::handler::{MessageHandler, SessionContext};
use super::reader::run_read_loop;
use super::transport::{FrameReader, FrameWriter, ReadError};
use super::watchers::{spawn_connection_closer, spawn_lifecycle_watcher};
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_SUSPENDED_REJECTIONS_TOTAL,
};
use crate::resource::Resource;

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The resource was suspended when the session opened.
    Rejected,
    /// The read loop ended with this error.
    Closed(ReadError),
}

/// Removes the session from its resource's registry when dropped.
struct Registration {
    resource: Arc<Resource>,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.resource.sessions().remove(&self.id) {
            debug!(session_id = %self.id, "session deregistered");
        }
    }
}

/// A registered, not yet running session.
pub struct Session<R> {
    id: SessionId,
    token: CancellationToken,
    resource: Arc<Resource>,
    reader: R,
    writer: Arc<dyn FrameWriter>,
    registration: Registration,
}

impl<R: FrameReader> Session<R> {
    /// Create a session for a freshly upgraded connection and register it.
    ///
    /// The session token is a child of `request_token`, so cancelling the
    /// request (or anything above it) ends the session.
    pub fn open(
        request_token: &CancellationToken,
        resource: Arc<Resource>,
        reader: R,
        writer: Arc<dyn FrameWriter>,
    ) -> Result<Self, SessionError> {
        Self::open_with_id(SessionId::new(), request_token, resource, reader, writer)
    }

    /// [`Session::open`] with a caller-chosen id.
    pub fn open_with_id(
        id: SessionId,
        request_token: &CancellationToken,
        resource: Arc<Resource>,
        reader: R,
        writer: Arc<dyn FrameWriter>,
    ) -> Result<Self, SessionError> {
        let token = request_token.child_token();
        resource.sessions().push(id.clone(), token.clone())?;
        let registration = Registration {
            resource: Arc::clone(&resource),
            id: id.clone(),
        };
        Ok(Self {
            id,
            token,
            resource,
            reader,
            writer,
            registration,
        })
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// A handle to the session token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drive the session to completion.
    #[instrument(skip_all, fields(session_id = %self.id, resource_id = %self.resource.id()))]
    pub async fn run(self, handler: Arc<dyn MessageHandler>) -> SessionOutcome {
        let Self {
            id,
            token,
            resource,
            mut reader,
            writer,
            registration,
        } = self;

        info!("websocket session opened");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        // Cancels the token even if this future is dropped or a task panics through it.
        let _cancel_on_exit = token.clone().drop_guard();

        let mut tasks = vec![
            spawn_connection_closer(token.clone(), Arc::clone(&writer)),
            spawn_lifecycle_watcher(token.clone(), resource.deletion_token()),
        ];

        let outcome = if resource.is_suspended() {
            reject_suspended(writer.as_ref()).await;
            SessionOutcome::Rejected
        } else {
            tasks.push(spawn_event_forwarder(
                token.clone(),
                resource.subscribe(),
                Arc::clone(&writer),
            ));
            let ctx = SessionContext::new(id, token.clone(), Arc::clone(&resource), writer);
            SessionOutcome::Closed(run_read_loop(&mut reader, &ctx, &handler).await)
        };

        token.cancel();
        drop(registration);
        await_tasks(tasks).await;

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        info!(?outcome, "websocket session closed");
        outcome
    }
}

async fn reject_suspended(writer: &dyn FrameWriter) {
    counter!(WS_SUSPENDED_REJECTIONS_TOTAL).increment(1);
    debug!("resource is suspended, rejecting session");
    let code = CloseCode::from(SUSPENDED_CLOSE_CODE);
    if let Err(e) = writer.send_close(code, SUSPENDED_CLOSE_REASON).await {
        debug!(error = %e, "failed to send suspension close frame");
    }
}

/// Upper bound on how long teardown waits for the background tasks.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Join the background tasks, aborting whatever is still stuck after
/// [`TASK_JOIN_TIMEOUT`].
async fn await_tasks(tasks: Vec<JoinHandle<()>>) {
    let aborts: Vec<AbortHandle> = tasks.iter().map(JoinHandle::abort_handle).collect();
    match tokio::time::timeout(TASK_JOIN_TIMEOUT, futures::future::join_all(tasks)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    warn!(error = %e, "session task failed");
                }
            }
        }
        Err(_) => {
            warn!(
                timeout = ?TASK_JOIN_TIMEOUT,
                "session tasks did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
