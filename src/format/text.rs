//! Plain text rendering for `show` and the comment tree.
//!
//! Layout:
//! - a `=` rule opens the issue
//! - each message prints its headers, text parts and numbered attachments
//! - a `-` rule closes each message
//! - `Comments:` lists the replies below the shown message, indented by depth

use std::fmt::Write as _;

use mailtrack_lib::{Message, Thread, ThreadEntry};

pub const RULE_WIDTH: usize = 70;

/// Headers printed above a message body, in this order.
const SHOWN_HEADERS: [&str; 4] = ["From", "Date", "Subject", "State"];

#[must_use]
pub fn heavy_rule() -> String {
    "=".repeat(RULE_WIDTH)
}

#[must_use]
pub fn light_rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// Options shared by every rendered message.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Drop body lines starting with this prefix.
    pub skip: Option<String>,
    /// Print the stored message verbatim.
    pub raw: bool,
}

impl RenderOptions {
    fn keeps(&self, line: &str) -> bool {
        self.skip
            .as_deref()
            .is_none_or(|prefix| prefix.is_empty() || !line.starts_with(prefix))
    }
}

fn push_text(out: &mut String, text: &str, opts: &RenderOptions) {
    for line in text.lines().filter(|l| opts.keeps(l)) {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

/// Render one message. `index` 0 is the root and gets no `Comment:` line.
#[must_use]
pub fn format_message(message: &Message, index: usize, opts: &RenderOptions) -> String {
    let mut out = String::new();
    if index > 0 {
        let _ = writeln!(out, "Comment: {index}");
    }

    if opts.raw {
        let raw = String::from_utf8_lossy(&message.to_bytes()).into_owned();
        push_text(&mut out, raw.trim(), opts);
        return out;
    }

    for name in SHOWN_HEADERS {
        if let Some(value) = message.header(name) {
            let _ = writeln!(out, "{name}: {value}");
        }
    }

    let parts = message.parts();
    for text in &parts.text {
        out.push('\n');
        push_text(&mut out, text.trim(), opts);
    }
    for attachment in &parts.attachments {
        let _ = writeln!(
            out,
            "\n{}: Attachment {}",
            attachment.number,
            attachment.describe()
        );
    }
    out
}

/// One tree line: `  ` per depth level, then `index: [author] subject`.
#[must_use]
pub fn format_tree_line(entry: &ThreadEntry) -> String {
    format!(
        "{}{}: [{}] {}",
        "  ".repeat(entry.depth),
        entry.index,
        entry.author,
        entry.subject
    )
}

/// `Comments:` block for the replies below `index`; empty when there are none.
#[must_use]
pub fn format_comment_tree(thread: &Thread<'_>, index: usize) -> String {
    let entries = thread.render_tree(index);
    if entries.is_empty() {
        return String::new();
    }
    let mut out = String::from("Comments:\n");
    for entry in &entries {
        out.push_str(&format_tree_line(entry));
        out.push('\n');
    }
    out.push_str(&light_rule());
    out.push('\n');
    out
}

/// Render an issue for `show`.
///
/// With `all`, every message is printed in date order. Otherwise the
/// message at `index` is printed (preceded by the root's subject and state
/// when it is a comment), followed by the tree of replies below it.
#[must_use]
pub fn format_issue(thread: &Thread<'_>, index: usize, all: bool, opts: &RenderOptions) -> String {
    let mut out = heavy_rule();
    out.push('\n');

    if all {
        for i in 0..thread.len() {
            if let Some(message) = thread.message(i) {
                out.push_str(&format_message(message, i, opts));
                out.push_str(&light_rule());
                out.push('\n');
            }
        }
        return out;
    }

    let index = if index < thread.len() { index } else { 0 };
    if index > 0 {
        if let Some(root) = thread.message(0) {
            let _ = writeln!(out, "Subject: {}", root.subject());
            let _ = writeln!(out, "State: {}", root.header("State").unwrap_or(""));
            out.push_str(&light_rule());
            out.push('\n');
        }
    }
    if let Some(message) = thread.message(index) {
        out.push_str(&format_message(message, index, opts));
    }
    out.push_str(&light_rule());
    out.push('\n');
    out.push_str(&format_comment_tree(thread, index));
    out
}
