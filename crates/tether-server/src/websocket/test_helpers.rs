//! Shared fixtures for session tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tether_core::{CloseCode, HandlerError, InboundMessage, ResourceId, SessionId, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::handler::{MessageHandler, SessionContext};
use super::transport::FrameWriter;
use crate::resource::Resource;

/// Records every message on entry, then behaves by event name:
/// `fail` → invalid args, `internal` → internal error, `suspend` → suspended,
/// anything else → success.
pub(crate) struct ScriptedHandler {
    seen: mpsc::UnboundedSender<InboundMessage>,
}

impl ScriptedHandler {
    pub(crate) fn new() -> (Arc<dyn MessageHandler>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { seen }), rx)
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(
        &self,
        _session: &SessionContext,
        message: &InboundMessage,
    ) -> Result<(), HandlerError> {
        let _ = self.seen.send(message.clone());
        match message.event.as_str() {
            "fail" => Err(HandlerError::invalid_args("fail", "scripted failure")),
            "internal" => Err(HandlerError::Internal("secret connection string".into())),
            "suspend" => Err(HandlerError::Suspended),
            _ => Ok(()),
        }
    }
}

pub(crate) fn make_resource() -> Arc<Resource> {
    Arc::new(Resource::new(ResourceId::from("srv-test"), 50))
}

pub(crate) fn make_context(writer: Arc<dyn FrameWriter>) -> (SessionContext, Arc<Resource>) {
    let resource = make_resource();
    let ctx = SessionContext::new(
        SessionId::new(),
        CancellationToken::new(),
        Arc::clone(&resource),
        writer,
    );
    (ctx, resource)
}

/// A writer whose peer never drains: every send stays pending forever.
/// `close` hangs too when built with `stall_close`.
pub(crate) struct StalledWriter {
    stall_close: bool,
    close_calls: AtomicUsize,
}

impl StalledWriter {
    pub(crate) fn new(stall_close: bool) -> Arc<Self> {
        Arc::new(Self {
            stall_close,
            close_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameWriter for StalledWriter {
    async fn send_text(&self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn send_close(&self, _code: CloseCode, _reason: &str) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}
