//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded. Startup aborts on any of these.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Settings file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON, or a value has the wrong type.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// Settings file that failed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A value parsed but is outside what the server accepts.
    #[error("invalid {key}: {reason}")]
    Invalid {
        /// Dotted settings key, e.g. `session.consoleBacklogLines`.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl SettingsError {
    pub(crate) fn parse(path: &std::path::Path, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
