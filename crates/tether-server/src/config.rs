//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_settings::TetherSettings;

/// Configuration for the tether server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Console lines kept per resource.
    pub console_backlog_lines: usize,
    /// Graceful shutdown budget in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &TetherSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            console_backlog_lines: settings.session.console_backlog_lines,
            shutdown_timeout_ms: settings.server.shutdown_timeout_ms,
        }
    }

    /// Graceful shutdown budget.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 4 * 1024 * 1024, // 4 MB
            console_backlog_lines: 150,
            shutdown_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_ephemeral_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn from_settings_copies_fields() {
        let mut settings = TetherSettings::default();
        settings.server.port = 9090;
        settings.server.max_message_size = 1024;
        settings.session.console_backlog_lines = 7;
        settings.server.shutdown_timeout_ms = 250;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.max_message_size, 1024);
        assert_eq!(cfg.console_backlog_lines, 7);
        assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.console_backlog_lines, cfg.console_backlog_lines);
    }
}
