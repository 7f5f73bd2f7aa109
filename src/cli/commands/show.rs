//! Show command implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use mailtrack_lib::Message;
use tracing::{debug, info};

use crate::cli::{Context, ShowArgs};
use crate::error::{MailtrackError, Result};
use crate::format::{IssueDetails, RenderOptions, format_issue};

use super::print_json;

/// Execute the show command.
///
/// # Errors
///
/// Returns an error if the issue cannot be resolved or read, the reader
/// fails, or an attachment cannot be written.
pub fn execute(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let handle = ctx.index.open_issue(&args.id)?;
    if args.reader {
        return run_reader(&ctx.config.reader, handle.dir());
    }
    handle.require_root()?;

    let thread = handle.thread();
    let index = if args.index < thread.len() {
        args.index
    } else {
        eprintln!("Comment out of range, showing the issue itself");
        0
    };

    if ctx.json {
        print_json(&IssueDetails::new(handle.id(), &thread, index, args.all))?;
    } else {
        let opts = RenderOptions {
            skip: Some(args.skip.clone()),
            raw: ctx.verbose > 0,
        };
        print!("{}", format_issue(&thread, index, args.all, &opts));
    }

    if !args.extract.is_empty() {
        if let Some(message) = thread.message(index) {
            extract_attachments(message, &args.extract, &args.output)?;
        }
    }
    Ok(())
}

/// Write the numbered attachments of `message` into `dir`, creating it.
/// Existing files are overwritten. Returns the written paths.
///
/// # Errors
///
/// Returns `Io` if the folder or a file cannot be written.
pub fn extract_attachments(message: &Message, numbers: &[usize], dir: &Path) -> Result<Vec<PathBuf>> {
    let parts = message.parts();
    let mut written = Vec::new();
    for &number in numbers {
        let Some(attachment) = parts.attachments.iter().find(|a| a.number == number) else {
            eprintln!("No attachment {number} in this message");
            continue;
        };
        fs::create_dir_all(dir)?;
        let path = dir.join(attachment.output_name());
        fs::write(&path, &attachment.bytes)?;
        info!(number, path = %path.display(), "Extracted attachment");
        written.push(path);
    }
    Ok(written)
}

fn run_reader(reader: &str, issue_dir: &Path) -> Result<()> {
    let failure = |reason: String| MailtrackError::External {
        command: reader.to_string(),
        reason,
    };
    let mut words = reader.split_whitespace();
    let program = words.next().ok_or_else(|| failure("empty command".to_string()))?;
    debug!(reader, dir = %issue_dir.display(), "Launching mail reader");
    let status = Command::new(program)
        .args(words)
        .arg(issue_dir)
        .status()
        .map_err(|e| failure(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(failure(status.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_files() -> Message {
        let mut msg = Message::new();
        msg.set_header("Subject", "crash");
        msg.set_body("see attached\n");
        msg.with_attachments(vec![
            ("logs/crash.log".to_string(), b"panic at line 3\n".to_vec()),
            ("core.bin".to_string(), vec![1, 2, 3]),
        ])
    }

    #[test]
    fn test_extract_selected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested/out");
        let written = extract_attachments(&with_files(), &[2, 9], &out).unwrap();
        assert_eq!(written, vec![out.join("core.bin")]);
        assert_eq!(fs::read(out.join("core.bin")).unwrap(), vec![1, 2, 3]);
        assert!(!out.join("crash.log").exists());
    }

    #[test]
    fn test_extract_uses_basename() {
        let dir = TempDir::new().unwrap();
        let written = extract_attachments(&with_files(), &[1], dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("crash.log")]);
        assert_eq!(
            fs::read_to_string(dir.path().join("crash.log")).unwrap(),
            "panic at line 3\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_reader_failure_reported() {
        let dir = TempDir::new().unwrap();
        assert!(run_reader("true", dir.path()).is_ok());
        assert!(matches!(
            run_reader("false", dir.path()),
            Err(MailtrackError::External { .. })
        ));
    }
}
