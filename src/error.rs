//! Error types for the `mt` CLI.
//!
//! Engine errors pass through unchanged; the CLI adds configuration,
//! version-control and editor failures.

use std::path::PathBuf;

use mailtrack_lib::TrackerError;
use thiserror::Error;

/// Primary error type for CLI operations.
#[derive(Error, Debug)]
pub enum MailtrackError {
    /// Issue store failure.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    // === Configuration Errors ===
    /// A config file could not be parsed.
    #[error("Invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config value is unusable.
    #[error("Invalid config value for {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    // === Collaborator Errors ===
    /// Version control operation failed.
    #[error("Version control error: {0}")]
    Vcs(#[from] git2::Error),

    /// The editor could not be started.
    #[error("Failed to run editor '{command}': {reason}")]
    Editor { command: String, reason: String },

    /// An external command (mail reader) failed.
    #[error("Command '{command}' failed: {reason}")]
    External { command: String, reason: String },

    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailtrackError {
    /// True for conditions reported as a warning rather than a failure.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        match self {
            Self::Tracker(e) => e.is_user_error(),
            _ => false,
        }
    }
}

/// Result type using `MailtrackError`.
pub type Result<T> = std::result::Result<T, MailtrackError>;
