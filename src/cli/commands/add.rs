//! Add command implementation.
//!
//! Without an id a new issue is created; with an id a comment is added in
//! reply to one of its messages. Property updates are written to the root
//! message while the same issue lock is held.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use mailtrack_lib::index::keys_by_date;
use mailtrack_lib::util::{reply_message_id, reply_subject, root_message_id};
use mailtrack_lib::{IssueHandle, Message, TrackerError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{AddArgs, Context};
use crate::editor::Editor;
use crate::error::Result;
use crate::format::{IssueDetails, RenderOptions, format_issue};
use crate::vcs::commit_message;

use super::print_json;

/// Headers that tie the thread together and cannot be set with `-p`.
const PROTECTED_PROPERTIES: [&str; 3] = ["Message-Id", "References", "In-Reply-To"];

const SEED_SUBJECT: &str = "brief description";
const SEED_BODY: &str = "Detailed description.";

#[derive(Debug, Serialize)]
struct AddedIssue<'a> {
    id: &'a str,
    path: &'a std::path::Path,
}

/// Execute the add command.
///
/// # Errors
///
/// Returns an error if a property is malformed, the issue cannot be
/// resolved, the editor fails, or the message cannot be stored.
pub fn execute(args: &AddArgs, ctx: &Context, editor: &dyn Editor) -> Result<()> {
    let properties = parse_properties(&args.property)?;
    let user = ctx.username();
    let date = Local::now().to_rfc2822();

    match &args.id {
        None => create_issue(args, ctx, editor, &user, &date, &properties),
        Some(id) => add_comment(id, args, ctx, editor, &user, &date, &properties),
    }
}

/// Parse `KEY=VALUE` updates, rejecting the thread headers.
fn parse_properties(raw: &[String]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            return Err(TrackerError::validation("property", format!("expected KEY=VALUE, got '{item}'")).into());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(TrackerError::validation("property", format!("missing key in '{item}'")).into());
        }
        if PROTECTED_PROPERTIES.iter().any(|p| p.eq_ignore_ascii_case(key)) {
            return Err(TrackerError::validation("property", format!("{key} cannot be changed")).into());
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}

fn seed_text(user: &str, date: &str, state: Option<&str>, subject: &str) -> String {
    let mut text = format!("From: {user}\nDate: {date}\n");
    if let Some(state) = state {
        text.push_str(&format!("State: {state}\n"));
    }
    text.push_str(&format!("Subject: {subject}\n\n{SEED_BODY}"));
    text
}

/// Run the editor on `seed`; `None` means the user gave up.
fn edit_text(editor: &dyn Editor, seed: &str) -> Result<Option<String>> {
    let text = editor.edit(seed)?;
    if text.trim().is_empty() {
        eprintln!("Empty issue, ignoring");
        return Ok(None);
    }
    if text.trim() == seed.trim() {
        eprintln!("Unchanged issue text, ignoring");
        return Ok(None);
    }
    Ok(Some(text))
}

/// `-m` text; blank text counts as absent so the editor opens instead.
fn message_subject(args: &AddArgs) -> Option<&str> {
    args.message.as_deref().filter(|s| !s.trim().is_empty())
}

fn create_issue(
    args: &AddArgs,
    ctx: &Context,
    editor: &dyn Editor,
    user: &str,
    date: &str,
    properties: &[(String, String)],
) -> Result<()> {
    let state = ctx.config.default_state.as_str();
    let text = if let Some(subject) = message_subject(args) {
        format!("From: {user}\nDate: {date}\nSubject: {subject}\nState: {state}\n")
    } else {
        let seed = seed_text(user, date, Some(state), SEED_SUBJECT);
        match edit_text(editor, &seed)? {
            Some(text) => text,
            None => return Ok(()),
        }
    };

    let mut message = Message::from_edited_text(&text).attach_files(&args.attach)?;
    for (key, value) in properties {
        message.set_header(key, value);
    }

    let (id, mut mailbox) = ctx.index.create_issue()?;
    message.set_header("Message-Id", &root_message_id(&id));
    let path = match mailbox.with_lock(|mb| mb.add(&message).map(|(_, path)| path)) {
        Ok(path) => path,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(mailbox.dir()) {
                warn!(error = %cleanup, "Could not remove unfinished issue folder");
            }
            return Err(e.into());
        }
    };
    info!(id = %id, "Created issue");

    ctx.vcs.stage(std::slice::from_ref(&path))?;
    if args.commit {
        ctx.vcs
            .commit(&[mailbox.dir().to_path_buf()], &commit_message(&id, message.subject()))?;
    }

    if ctx.json {
        return print_json(&AddedIssue { id: &id, path: &path });
    }
    println!("Added new issue {id}");
    Ok(())
}

fn add_comment(
    prefix: &str,
    args: &AddArgs,
    ctx: &Context,
    editor: &dyn Editor,
    user: &str,
    date: &str,
    properties: &[(String, String)],
) -> Result<()> {
    let mut handle = ctx.index.open_issue(prefix)?;
    handle.require_root()?;

    let keys = keys_by_date(handle.mailbox());
    let target = if args.index < keys.len() {
        args.index
    } else {
        eprintln!("No such comment number in mailbox, commenting on the issue itself");
        0
    };
    let parent_subject = keys
        .get(target)
        .and_then(|k| handle.mailbox().get(k))
        .map(|m| m.subject().to_string())
        .unwrap_or_default();

    let text = if let Some(subject) = message_subject(args) {
        format!("From: {user}\nDate: {date}\nSubject: {subject}\n")
    } else if args.no_property_comment && !properties.is_empty() {
        let changes: Vec<String> = properties.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!(
            "From: {user}\nDate: {date}\nSubject: changed properties ({})\n",
            changes.join(", ")
        )
    } else {
        let seed = seed_text(user, date, None, &reply_subject(&parent_subject));
        match edit_text(editor, &seed)? {
            Some(text) => text,
            None => return Ok(()),
        }
    };
    let message = Message::from_edited_text(&text).attach_files(&args.attach)?;

    let id = handle.id().to_string();
    let written = write_comment(&mut handle, target, message, properties)?;
    debug!(id = %id, files = written.len(), "Comment stored");

    ctx.vcs.stage(&written)?;
    if args.commit {
        let subject = handle.root().map(Message::subject).unwrap_or_default().to_string();
        ctx.vcs
            .commit(&[handle.dir().to_path_buf()], &commit_message(&id, &subject))?;
    }

    let thread = handle.thread();
    if ctx.json {
        return print_json(&IssueDetails::new(&id, &thread, 0, false));
    }
    print!("{}", format_issue(&thread, 0, false, &RenderOptions::default()));
    Ok(())
}

/// Store `message` as a reply to the message at `target` (date order) and
/// apply `properties` to the root, all under the issue lock. The reply
/// target is looked up again once the lock is held.
fn write_comment(
    handle: &mut IssueHandle,
    target: usize,
    mut message: Message,
    properties: &[(String, String)],
) -> Result<Vec<PathBuf>> {
    let id = handle.id().to_string();
    let written = handle.mailbox_mut().with_lock(|mb| {
        let keys = keys_by_date(mb);
        let parent_key = keys
            .get(target)
            .or_else(|| keys.first())
            .ok_or_else(|| TrackerError::MalformedIssue { id: id.clone() })?;
        let parent_id = mb
            .get(parent_key)
            .and_then(Message::message_id)
            .map(ToString::to_string);

        message.set_header("Message-Id", &reply_message_id(&id));
        if let Some(parent_id) = parent_id {
            message.set_header("References", &parent_id);
            message.set_header("In-Reply-To", &parent_id);
        }
        let (_, path) = mb.add(&message)?;
        let mut written = vec![path];

        if !properties.is_empty() {
            let mut root = mb
                .root()
                .cloned()
                .ok_or_else(|| TrackerError::MalformedIssue { id: id.clone() })?;
            for (key, value) in properties {
                root.set_header(key, value);
            }
            written.push(mb.replace_root(&root)?);
        }
        Ok(written)
    })?;
    Ok(written)
}
