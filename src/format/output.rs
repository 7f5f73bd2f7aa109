use chrono::{DateTime, FixedOffset};
use mailtrack_lib::{Attachment, IssueSummary, Message, Thread, ThreadEntry};
use serde::Serialize;

/// Issue summary with its rendered line, for list/find.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryLine {
    #[serde(flatten)]
    pub summary: IssueSummary,
    pub line: String,
}

/// Distinct values of one property (`list -p KEY`).
#[derive(Debug, Clone, Serialize)]
pub struct PropertyValues {
    pub property: String,
    pub values: Vec<String>,
}

/// Attachment metadata without the payload.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentInfo {
    pub number: usize,
    pub content_type: String,
    pub filename: Option<String>,
    pub size: usize,
}

impl From<&Attachment> for AttachmentInfo {
    fn from(a: &Attachment) -> Self {
        Self {
            number: a.number,
            content_type: a.content_type.clone(),
            filename: a.filename.clone(),
            size: a.size(),
        }
    }
}

/// One message of a shown issue.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub index: usize,
    pub key: String,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub from: String,
    pub subject: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub headers: Vec<(String, String)>,
    pub text: Vec<String>,
    pub attachments: Vec<AttachmentInfo>,
}

impl MessageView {
    #[must_use]
    pub fn new(index: usize, key: &str, message: &Message) -> Self {
        let parts = message.parts();
        Self {
            index,
            key: key.to_string(),
            message_id: message.message_id().map(ToString::to_string),
            in_reply_to: message.parent_id().map(ToString::to_string),
            from: message.author().to_string(),
            subject: message.subject().to_string(),
            date: message.date(),
            headers: message.headers().to_vec(),
            text: parts.text,
            attachments: parts.attachments.iter().map(AttachmentInfo::from).collect(),
        }
    }
}

/// Comment tree node.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    pub index: usize,
    pub depth: usize,
    pub author: String,
    pub subject: String,
}

impl From<ThreadEntry> for CommentNode {
    fn from(e: ThreadEntry) -> Self {
        Self {
            index: e.index,
            depth: e.depth,
            author: e.author,
            subject: e.subject,
        }
    }
}

/// Issue with its messages and comment tree, for show.
#[derive(Debug, Clone, Serialize)]
pub struct IssueDetails {
    pub id: String,
    pub messages: Vec<MessageView>,
    pub comments: Vec<CommentNode>,
}

impl IssueDetails {
    /// Messages shown are every message with `all`, else only `index`;
    /// comments are the replies below the shown message.
    #[must_use]
    pub fn new(id: &str, thread: &Thread<'_>, index: usize, all: bool) -> Self {
        let view = |i: usize| {
            thread
                .message(i)
                .zip(thread.key(i))
                .map(|(m, k)| MessageView::new(i, k, m))
        };
        let (messages, comments) = if all {
            (
                (0..thread.len()).filter_map(view).collect(),
                thread.render_all().into_iter().map(CommentNode::from).collect(),
            )
        } else {
            (
                view(index).into_iter().collect(),
                thread.render_tree(index).into_iter().map(CommentNode::from).collect(),
            )
        };
        Self {
            id: id.to_string(),
            messages,
            comments,
        }
    }
}
