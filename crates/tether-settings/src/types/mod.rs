//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their production default.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "session": { "consoleBacklogLines": 500 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// HTTP/WebSocket listener settings.
    pub server: ServerSettings,
    /// Per-session and per-resource behaviour.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TetherSettings =
            serde_json::from_str(r#"{"server": {"port": 9999}}"#).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.session.console_backlog_lines, 150);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(TetherSettings::default()).unwrap();
        assert!(value["server"]["maxMessageSize"].is_number());
        assert!(value["session"]["consoleBacklogLines"].is_number());
        assert!(value["server"]["shutdownTimeoutMs"].is_number());
    }
}
