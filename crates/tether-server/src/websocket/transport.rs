//! Frame-level transport seam between a session and its socket.
//!
//! A connection is split into a [`FrameReader`] owned by the read loop and a
//! shared [`FrameWriter`] used by handlers, the suspension check and the
//! connection closer. [`split`] adapts an axum [`WebSocket`];
//! [`super::memory`] provides an in-process pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tether_core::{CloseCode, OutboundMessage, TransportError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A data frame read from the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Raw payload bytes, regardless of frame type.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// Why a read did not produce a frame. Every variant ends the read loop.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer sent a close frame, or vanished (reported as 1006).
    #[error("websocket closed by peer ({code}): {reason}")]
    Closed {
        /// Close code sent by the peer.
        code: CloseCode,
        /// Close reason sent by the peer.
        reason: String,
    },
    /// The connection was closed on this side while the read was pending.
    #[error("connection closed locally")]
    LocallyClosed,
    /// Any other transport failure.
    #[error("websocket read failed: {0}")]
    Io(String),
}

impl ReadError {
    /// Close code worth a warning: a peer close outside the expected set.
    pub fn unexpected_close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code, .. } if !code.is_expected() => Some(*code),
            _ => None,
        }
    }

    /// The read error reported when the peer disappears without a close frame.
    pub fn abnormal() -> Self {
        Self::Closed {
            code: CloseCode::Abnormal,
            reason: "unexpected EOF".into(),
        }
    }
}

/// Read half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next data frame. Control frames are consumed internally.
    async fn next_frame(&mut self) -> Result<Frame, ReadError>;
}

/// Write half of a connection, shared between tasks.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Send a text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Send a close frame. The connection stays open until [`FrameWriter::close`].
    async fn send_close(&self, code: CloseCode, reason: &str) -> Result<(), TransportError>;

    /// Close the connection. Calls after the first are no-ops returning `Ok`.
    ///
    /// A pending [`FrameReader::next_frame`] on the same connection fails with
    /// [`ReadError::LocallyClosed`].
    async fn close(&self) -> Result<(), TransportError>;

    /// Encode and send an outbound message.
    async fn send_message(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.send_text(json).await
    }
}

/// Shared state between the two halves of an axum connection.
struct ConnectionState {
    /// Cancelled by the first `close()`; wakes a pending read.
    closed: CancellationToken,
    close_once: AtomicBool,
    /// Set once a close frame has gone out or the peer is gone.
    finished: AtomicBool,
}

/// Read half of an axum WebSocket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
    state: Arc<ConnectionState>,
}

/// Write half of an axum WebSocket.
pub struct WsWriter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    state: Arc<ConnectionState>,
}

/// Split an upgraded socket into reader and shared writer halves.
pub fn split(socket: WebSocket) -> (WsReader, Arc<WsWriter>) {
    let (sink, stream) = socket.split();
    let state = Arc::new(ConnectionState {
        closed: CancellationToken::new(),
        close_once: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });
    let reader = WsReader {
        stream,
        state: Arc::clone(&state),
    };
    let writer = Arc::new(WsWriter {
        sink: Mutex::new(sink),
        state,
    });
    (reader, writer)
}

#[async_trait]
impl FrameReader for WsReader {
    async fn next_frame(&mut self) -> Result<Frame, ReadError> {
        loop {
            let message = tokio::select! {
                biased;
                () = self.state.closed.cancelled() => return Err(ReadError::LocallyClosed),
                message = self.stream.next() => message,
            };
            let err = match message {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Frame::Binary(bytes.to_vec())),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(Some(frame)))) => ReadError::Closed {
                    code: CloseCode::from(frame.code),
                    reason: frame.reason.as_str().to_owned(),
                },
                Some(Ok(Message::Close(None))) => ReadError::Closed {
                    code: CloseCode::NoStatusReceived,
                    reason: String::new(),
                },
                Some(Err(e)) => ReadError::Io(e.to_string()),
                None => ReadError::abnormal(),
            };
            self.state.finished.store(true, Ordering::Release);
            return Err(err);
        }
    }
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.state.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        // Dropping the send on local close releases the sink for `close()`.
        tokio::select! {
            () = self.state.closed.cancelled() => Err(TransportError::Closed),
            result = async { self.sink.lock().await.send(Message::Text(text.into())).await } => {
                result.map_err(|e| TransportError::Io(e.to_string()))
            }
        }
    }

    async fn send_close(&self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        if self.state.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let frame = CloseFrame {
            code: code.as_u16(),
            reason: reason.to_owned().into(),
        };
        let result = tokio::select! {
            () = self.state.closed.cancelled() => Err(TransportError::Closed),
            result = async { self.sink.lock().await.send(Message::Close(Some(frame))).await } => {
                result.map_err(|e| TransportError::Io(e.to_string()))
            }
        };
        self.state.finished.store(true, Ordering::Release);
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.state.close_once.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.state.closed.cancel();
        if self.state.finished.load(Ordering::Acquire) {
            // Close handshake already started by one side; dropping the halves ends it.
            return Ok(());
        }
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_payloads() {
        assert_eq!(Frame::Text("{}".into()).payload(), b"{}");
        assert_eq!(Frame::Binary(vec![1, 2]).payload(), &[1, 2]);
    }

    #[test]
    fn unexpected_close_code_only_for_peer_closes() {
        let unexpected = ReadError::Closed {
            code: CloseCode::Other(4000),
            reason: "custom".into(),
        };
        assert_eq!(unexpected.unexpected_close_code(), Some(CloseCode::Other(4000)));

        let normal = ReadError::Closed {
            code: CloseCode::Normal,
            reason: String::new(),
        };
        assert_eq!(normal.unexpected_close_code(), None);
        assert_eq!(ReadError::abnormal().unexpected_close_code(), None);
        assert_eq!(ReadError::LocallyClosed.unexpected_close_code(), None);
        assert_eq!(ReadError::Io("reset".into()).unexpected_close_code(), None);
    }

    #[test]
    fn read_error_display() {
        let err = ReadError::Closed {
            code: CloseCode::Other(4000),
            reason: "bye".into(),
        };
        assert_eq!(err.to_string(), "websocket closed by peer (4000): bye");
    }
}
