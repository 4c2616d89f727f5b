//! Settings loading.
//!
//! Layers, lowest priority first: compiled defaults, the JSON settings file
//! (merged key by key, `null` leaves the default in place), then `TETHER_*`
//! environment variables. The result is validated before it is returned.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TetherSettings;

/// `~/.tether/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".tether").join("settings.json")
}

/// Load settings from [`settings_path`].
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<TetherSettings> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(TetherSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    debug!(path = %path.display(), "loading settings file");

    let user: Value = serde_json::from_str(&content).map_err(|e| SettingsError::parse(path, e))?;
    let mut merged =
        serde_json::to_value(TetherSettings::default()).map_err(|e| SettingsError::parse(path, e))?;
    merge_into(&mut merged, user);
    serde_json::from_value(merged).map_err(|e| SettingsError::parse(path, e))
}

/// Overlay `overlay` onto `base`. Objects merge per key; anything else replaces.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if !value.is_null() => {
                        let _ = base.insert(key, value);
                    }
                    None => {}
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `TETHER_*` overrides read through `lookup`.
///
/// Unparseable values are logged and skipped; range checks happen in
/// [`validate`].
pub fn apply_env_overrides(settings: &mut TetherSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = var("TETHER_HOST") {
        settings.server.host = host;
    }
    if let Some(port) = var("TETHER_PORT").and_then(|v| parse_or_warn("TETHER_PORT", &v)) {
        settings.server.port = port;
    }
    if let Some(size) =
        var("TETHER_MAX_MESSAGE_SIZE").and_then(|v| parse_or_warn("TETHER_MAX_MESSAGE_SIZE", &v))
    {
        settings.server.max_message_size = size;
    }
    if let Some(lines) =
        var("TETHER_CONSOLE_BACKLOG").and_then(|v| parse_or_warn("TETHER_CONSOLE_BACKLOG", &v))
    {
        settings.session.console_backlog_lines = lines;
    }
    if let Some(level) = var("TETHER_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(json) = var("TETHER_LOG_JSON").and_then(|v| parse_flag("TETHER_LOG_JSON", &v)) {
        settings.logging.json = json;
    }
}

fn parse_or_warn<T: FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        warn!(var = name, value, "ignoring unparseable environment override");
    }
    parsed
}

fn parse_flag(name: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(var = name, value, "ignoring unparseable environment override");
            None
        }
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &TetherSettings) -> Result<()> {
    let invalid = |key, reason| Err(SettingsError::Invalid { key, reason });

    if settings.server.host.trim().is_empty() {
        return invalid("server.host", "must not be empty");
    }
    if settings.server.max_message_size == 0 {
        return invalid("server.maxMessageSize", "must be greater than zero");
    }
    if settings.session.console_backlog_lines == 0 {
        return invalid("session.consoleBacklogLines", "must be greater than zero");
    }
    Ok(())
}
