//! `TetherServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tether_core::ResourceId;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::resource::{ResourceManager, ResourceSnapshot};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{MessageHandler, ResourceEventHandler, Session, transport};

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No resource with this id.
    #[error("server '{0}' not found")]
    NotFound(ResourceId),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live resources.
    pub resources: Arc<ResourceManager>,
    /// Shutdown coordinator; parent of every request token.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Handler for inbound session messages.
    pub handler: Arc<dyn MessageHandler>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The tether server.
pub struct TetherServer {
    config: Arc<ServerConfig>,
    resources: Arc<ResourceManager>,
    handler: Arc<dyn MessageHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl TetherServer {
    /// Create a server with an empty resource manager and the default handler.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let resources = Arc::new(ResourceManager::new(config.console_backlog_lines));
        Self {
            config: Arc::new(config),
            resources,
            handler: Arc::new(ResourceEventHandler),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Replace the inbound message handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            resources: Arc::clone(&self.resources),
            shutdown: Arc::clone(&self.shutdown),
            handler: Arc::clone(&self.handler),
            metrics: self.metrics.clone(),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/servers", get(list_handler))
            .route(
                "/api/servers/{id}",
                get(show_handler).post(create_handler).delete(delete_handler),
            )
            .route("/api/servers/{id}/suspend", post(suspend_handler))
            .route("/api/servers/{id}/unsuspend", post(unsuspend_handler))
            .route("/api/servers/{id}/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "tether server listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// Get the resource manager.
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.resources.len(),
        state.resources.session_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /api/servers
async fn list_handler(State(state): State<AppState>) -> Json<Vec<ResourceSnapshot>> {
    let snapshots = state
        .resources
        .list()
        .iter()
        .filter_map(|id| state.resources.get(id))
        .map(|r| r.snapshot())
        .collect();
    Json(snapshots)
}

/// GET /api/servers/{id}
async fn show_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResourceSnapshot>, ApiError> {
    let id = ResourceId::from(id);
    let resource = state.resources.get(&id).ok_or(ApiError::NotFound(id))?;
    Ok(Json(resource.snapshot()))
}

/// POST /api/servers/{id}. Idempotent.
async fn create_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> (StatusCode, Json<ResourceSnapshot>) {
    let (resource, created) = state.resources.create(ResourceId::from(id));
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    (status, Json(resource.snapshot()))
}

/// DELETE /api/servers/{id}. Force-closes every session on the resource.
async fn delete_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = ResourceId::from(id);
    match state.resources.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(id)),
    }
}

/// POST /api/servers/{id}/suspend
async fn suspend_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResourceSnapshot>, ApiError> {
    let id = ResourceId::from(id);
    let resource = state.resources.get(&id).ok_or(ApiError::NotFound(id))?;
    resource.suspend();
    Ok(Json(resource.snapshot()))
}

/// POST /api/servers/{id}/unsuspend
async fn unsuspend_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResourceSnapshot>, ApiError> {
    let id = ResourceId::from(id);
    let resource = state.resources.get(&id).ok_or(ApiError::NotFound(id))?;
    resource.unsuspend();
    Ok(Json(resource.snapshot()))
}

/// GET /api/servers/{id}/ws
///
/// Unknown resources and failed upgrades are rejected here, before a session
/// is registered.
async fn ws_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let id = ResourceId::from(id);
    let resource = state.resources.get(&id).ok_or(ApiError::NotFound(id))?;
    let request_token = state.shutdown.request_token();
    let handler = Arc::clone(&state.handler);

    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (reader, writer) = transport::split(socket);
            match Session::open(&request_token, resource, reader, writer) {
                Ok(session) => {
                    let _ = session.run(handler).await;
                }
                Err(e) => error!(error = %e, "failed to open websocket session"),
            }
        }))
}
