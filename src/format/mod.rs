//! Output formatting for `mt`.
//!
//! Human-readable text goes through [`text`]; `--json` emits the types in
//! [`output`]:
//! - [`SummaryLine`] - Issue summary plus its rendered line (list/find)
//! - [`PropertyValues`] - Distinct values of one property (list -p KEY)
//! - [`IssueDetails`] - Messages and comment tree (show)

mod output;
mod text;

pub use output::{
    AttachmentInfo, CommentNode, IssueDetails, MessageView, PropertyValues, SummaryLine,
};
pub use text::{
    RULE_WIDTH, RenderOptions, format_comment_tree, format_issue, format_message,
    format_tree_line, heavy_rule, light_rule,
};
