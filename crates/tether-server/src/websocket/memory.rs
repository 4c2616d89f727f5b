//! In-process connection pair.
//!
//! [`pair`] returns the session's reader and writer halves plus a
//! [`MemoryPeer`] that plays the remote client: it feeds frames in, observes
//! what the session wrote, and counts close calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tether_core::{CloseCode, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::transport::{Frame, FrameReader, FrameWriter, ReadError};

/// A frame written by the session side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WrittenFrame {
    /// A text frame.
    Text(String),
    /// A close frame.
    Close {
        /// Close code.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },
}

impl WrittenFrame {
    /// Parse a text frame as JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Text(text) => serde_json::from_str(text).ok(),
            Self::Close { .. } => None,
        }
    }
}

#[derive(Default)]
struct Shared {
    closed: CancellationToken,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

/// Session-side read half.
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Frame, ReadError>>,
    shared: Arc<Shared>,
}

/// Session-side write half.
pub struct MemoryWriter {
    outbound: mpsc::UnboundedSender<WrittenFrame>,
    shared: Arc<Shared>,
}

/// The remote end of a [`pair`].
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, ReadError>>>,
    outbound: mpsc::UnboundedReceiver<WrittenFrame>,
    shared: Arc<Shared>,
}

/// Create a connected reader, writer and peer.
pub fn pair() -> (MemoryReader, Arc<MemoryWriter>, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        MemoryReader {
            inbound: in_rx,
            shared: Arc::clone(&shared),
        },
        Arc::new(MemoryWriter {
            outbound: out_tx,
            shared: Arc::clone(&shared),
        }),
        MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            shared,
        },
    )
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn next_frame(&mut self) -> Result<Frame, ReadError> {
        tokio::select! {
            biased;
            () = self.shared.closed.cancelled() => Err(ReadError::LocallyClosed),
            item = self.inbound.recv() => item.unwrap_or_else(|| Err(ReadError::abnormal())),
        }
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.push(WrittenFrame::Text(text))
    }

    async fn send_close(&self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        self.push(WrittenFrame::Close {
            code,
            reason: reason.to_owned(),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.cancel();
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Io("injected close failure".into()));
        }
        Ok(())
    }
}

impl MemoryWriter {
    fn push(&self, frame: WrittenFrame) -> Result<(), TransportError> {
        if self.shared.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl MemoryPeer {
    /// Send a text frame to the session.
    pub fn send_text(&self, text: impl Into<String>) {
        self.push(Ok(Frame::Text(text.into())));
    }

    /// Send a binary frame to the session.
    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        self.push(Ok(Frame::Binary(bytes.into())));
    }

    /// Send `{"event": .., "args": [..]}` as a text frame.
    pub fn send_event(&self, event: &str, args: &[&str]) {
        self.send_text(serde_json::json!({ "event": event, "args": args }).to_string());
    }

    /// Send a close frame to the session.
    pub fn close(&self, code: u16, reason: &str) {
        self.push(Err(ReadError::Closed {
            code: CloseCode::from(code),
            reason: reason.to_owned(),
        }));
    }

    /// Drop the connection without a close frame.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Make every later `close()` on the session side report a failure.
    pub fn fail_close(&self) {
        self.shared.fail_close.store(true, Ordering::SeqCst);
    }

    /// Wait for the next frame written by the session.
    pub async fn next_written(&mut self) -> Option<WrittenFrame> {
        self.outbound.recv().await
    }

    /// Drain frames already written by the session.
    pub fn written(&mut self) -> Vec<WrittenFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// How many times the session side called `close()`.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the session side has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    fn push(&self, item: Result<Frame, ReadError>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(item);
        }
    }
}
