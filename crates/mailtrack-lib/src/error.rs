//! Error types for `mailtrack-lib`.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for issue store operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    // === Issue Errors ===
    /// No issue folder matches the given id or prefix.
    #[error("No such issue: {id}")]
    IssueNotFound { id: String },

    /// An id prefix matches more than one issue folder.
    #[error("Ambiguous issue id '{partial}': matches {matches:?}")]
    AmbiguousId {
        partial: String,
        matches: Vec<String>,
    },

    /// The issue folder has no root message.
    #[error("Malformed issue {id}: no root message")]
    MalformedIssue { id: String },

    // === Validation Errors ===
    /// Input validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// A date expression could not be parsed.
    #[error("Invalid date expression: {expr}")]
    InvalidDate { expr: String },

    /// A display template failed to compile or render.
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid regular expression in a search.
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    // === Storage Errors ===
    /// Directory or file layout problem.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Advisory lock could not be acquired in time.
    #[error("Timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage(reason.into())
    }

    /// True for "nothing there" conditions that callers degrade gracefully on.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::IssueNotFound { .. })
    }

    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousId { .. })
    }

    /// True for errors caused by user input rather than the environment.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound { .. }
                | Self::AmbiguousId { .. }
                | Self::MalformedIssue { .. }
                | Self::Validation { .. }
                | Self::InvalidDate { .. }
                | Self::Regex(_)
        )
    }
}

/// Result type using `TrackerError`.
pub type Result<T> = std::result::Result<T, TrackerError>;
