//! Editor collaborator: hand seed text to the user's editor and read back
//! what they saved.

use std::fs;
use std::io::Write;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{MailtrackError, Result};

/// Editor used when none is configured.
pub const FALLBACK_EDITOR: &str = "vi";

pub trait Editor {
    /// Return the edited text. Cancelling returns `seed` unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Editor` if the editor cannot be launched.
    fn edit(&self, seed: &str) -> Result<String>;
}

impl<F> Editor for F
where
    F: Fn(&str) -> Result<String>,
{
    fn edit(&self, seed: &str) -> Result<String> {
        self(seed)
    }
}

/// Runs an external command on a scratch file.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    #[must_use]
    pub fn new(command: Option<&str>) -> Self {
        Self {
            command: command
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(FALLBACK_EDITOR)
                .to_string(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    fn failure(&self, reason: impl ToString) -> MailtrackError {
        MailtrackError::Editor {
            command: self.command.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Editor for ExternalEditor {
    fn edit(&self, seed: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("mailtrack-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(seed.as_bytes())?;
        file.flush()?;

        let mut words = self.command.split_whitespace();
        let program = words.next().ok_or_else(|| self.failure("empty command"))?;
        debug!(editor = %self.command, path = %file.path().display(), "Launching editor");
        let status = Command::new(program)
            .args(words)
            .arg(file.path())
            .status()
            .map_err(|e| self.failure(e))?;

        if !status.success() {
            warn!(editor = %self.command, %status, "Editor exited with failure, discarding edit");
            return Ok(seed.to_string());
        }
        Ok(fs::read_to_string(file.path())?)
    }
}
