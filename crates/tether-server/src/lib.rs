//! # tether-server
//!
//! Axum HTTP + `WebSocket` server for managed resources.
//!
//! - HTTP endpoints: health check, Prometheus metrics, resource admin
//! - `WebSocket` sessions: one supervised session per upgraded connection,
//!   tied to a cancellation token and the resource's session registry
//! - Resource events fanned out to sessions via `tokio::sync::broadcast`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod resource;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use resource::{PowerAction, PowerState, Resource, ResourceManager, SessionRegistry};
pub use server::{ApiError, AppState, TetherServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::{MessageHandler, ResourceEventHandler, Session, SessionContext};
