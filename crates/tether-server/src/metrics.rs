//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket sessions opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Sessions refused because the resource was suspended (counter).
pub const WS_SUSPENDED_REJECTIONS_TOTAL: &str = "ws_suspended_rejections_total";
/// Failed handler invocations (counter, labels: kind).
pub const WS_HANDLER_ERRORS_TOTAL: &str = "ws_handler_errors_total";
/// Frames dropped because they were not valid messages (counter).
pub const WS_DECODE_FAILURES_TOTAL: &str = "ws_decode_failures_total";
