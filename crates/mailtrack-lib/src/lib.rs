//! `mailtrack-lib`: maildir-backed issue store engine.
//!
//! Issues live in a directory tree under the repository working copy, one
//! folder per issue and one RFC822 message per comment, so issue history is
//! versioned with the code it talks about.
//!
//! # Quick Start
//!
//! ```no_run
//! use mailtrack_lib::{IssueIndex, ListQuery, Message, StateTable};
//!
//! let index = IssueIndex::new(".issues", StateTable::default());
//!
//! // Create an issue
//! let (id, mut mailbox) = index.create_issue().unwrap();
//! let root = Message::parse(b"From: me\nSubject: login fails\nState: new\n\nBroken.\n");
//! mailbox.with_lock(|mb| mb.add(&root)).unwrap();
//!
//! // List open issues
//! let issues = index.list_issues().unwrap();
//! let open = index.filter(&issues, &ListQuery::default());
//! assert_eq!(open.len(), 1);
//! # let _ = id;
//! ```

pub mod datematch;
pub mod error;
pub mod filter;
pub mod index;
pub mod lock;
pub mod maildir;
pub mod message;
pub mod properties;
pub mod states;
pub mod thread;
pub mod util;

pub use datematch::DateMatcher;
pub use error::{Result, TrackerError};
pub use filter::{Predicate, SavedFilters};
pub use index::{
    FindMode, FindQuery, IssueHandle, IssueIndex, IssueSummary, ListQuery, OrderMode,
    sort_summaries,
};
pub use lock::IssueLock;
pub use maildir::Mailbox;
pub use message::{Attachment, Message, MessageParts};
pub use properties::{DisplayProperties, FormatRule, FormatRules, PropertySet};
pub use states::StateTable;
pub use thread::{Thread, ThreadEntry};
