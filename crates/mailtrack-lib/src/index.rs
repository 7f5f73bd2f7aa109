//! Issue Index: enumerate, resolve, filter, search and summarize issues.
//!
//! Every subfolder of the issues root is an issue; hidden entries (saved
//! filter files among them) and plain files are not. A missing issues root
//! is an empty index, never an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use regex::RegexBuilder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::datematch::DateMatcher;
use crate::error::{Result, TrackerError};
use crate::filter::{Predicate, matches_all};
use crate::maildir::Mailbox;
use crate::message::Message;
use crate::properties::{DisplayProperties, PropertySet};
use crate::states::StateTable;
use crate::thread::{Thread, order_by_date};
use crate::util::generate_issue_id;

// ============================================================================
// Query Types
// ============================================================================

/// Options for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Property tests; all must match. Non-empty disables the default
    /// hiding of resolved issues.
    pub predicates: Vec<Predicate>,
    /// Also show resolved issues when no predicates are given.
    pub show_all: bool,
    /// Restrict by the root message's date.
    pub date: Option<DateMatcher>,
}

/// How `find` compares the query with the property value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FindMode {
    #[default]
    Substring,
    Exact,
    Regex,
}

/// Options for `find`.
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub pattern: String,
    pub property: String,
    pub mode: FindMode,
    pub case_sensitive: bool,
}

impl FindQuery {
    /// Case-insensitive substring search on `subject`.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            property: "subject".to_string(),
            mode: FindMode::Substring,
            case_sensitive: false,
        }
    }
}

/// Date used to order summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMode {
    /// Date of the root message.
    #[default]
    New,
    /// Date of the most recent message.
    Latest,
}

impl FromStr for OrderMode {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "latest" => Ok(Self::Latest),
            other => Err(TrackerError::validation(
                "order",
                format!("expected 'new' or 'latest', got '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Handles and Summaries
// ============================================================================

/// A loaded issue folder.
#[derive(Debug, Clone)]
pub struct IssueHandle {
    id: String,
    mailbox: Mailbox,
}

impl IssueHandle {
    /// Load the issue at `dir`, creating missing staging folders.
    ///
    /// # Errors
    ///
    /// Propagates `Mailbox::open` errors.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let mailbox = Mailbox::open(dir)?;
        Ok(Self {
            id: mailbox.id(),
            mailbox,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.mailbox.dir()
    }

    #[must_use]
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    #[must_use]
    pub fn into_mailbox(self) -> Mailbox {
        self.mailbox
    }

    #[must_use]
    pub fn root(&self) -> Option<&Message> {
        self.mailbox.root()
    }

    /// Root message, or `MalformedIssue` when there is none.
    ///
    /// # Errors
    ///
    /// Returns `MalformedIssue` if no message lacks a reply reference.
    pub fn require_root(&self) -> Result<&Message> {
        self.root().ok_or_else(|| TrackerError::MalformedIssue {
            id: self.id.clone(),
        })
    }

    #[must_use]
    pub fn properties(&self) -> Option<PropertySet> {
        self.root().map(PropertySet::from_message)
    }

    /// Number of comments besides the root.
    #[must_use]
    pub fn reply_count(&self) -> usize {
        self.mailbox.len().saturating_sub(1)
    }

    #[must_use]
    pub fn thread(&self) -> Thread<'_> {
        Thread::build(&self.mailbox.pairs())
    }

    #[must_use]
    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        self.root().and_then(Message::date)
    }

    /// Date of the most recent message.
    #[must_use]
    pub fn latest(&self) -> Option<DateTime<FixedOffset>> {
        self.mailbox
            .entries()
            .iter()
            .filter_map(|e| e.message.date())
            .max()
    }

    /// Summary of the issue; `None` when it has no root.
    #[must_use]
    pub fn summary(&self) -> Option<IssueSummary> {
        let props = self.properties()?;
        Some(IssueSummary {
            id: self.id.clone(),
            properties: props,
            reply_count: self.reply_count(),
            created: self.created(),
            latest: self.latest(),
        })
    }
}

/// One listed issue.
#[derive(Debug, Clone, Serialize)]
pub struct IssueSummary {
    pub id: String,
    pub properties: PropertySet,
    pub reply_count: usize,
    pub created: Option<DateTime<FixedOffset>>,
    pub latest: Option<DateTime<FixedOffset>>,
}

impl IssueSummary {
    #[must_use]
    pub fn display(&self) -> DisplayProperties {
        DisplayProperties::new(self.id.clone(), self.reply_count, self.properties.clone())
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.properties.get("state")
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.properties.get("subject")
    }

    fn order_date(&self, order: OrderMode) -> Option<DateTime<FixedOffset>> {
        match order {
            OrderMode::New => self.created,
            OrderMode::Latest => self.latest,
        }
    }
}

/// Sort ascending by the chosen date; undated summaries first.
pub fn sort_summaries(summaries: &mut [IssueSummary], order: OrderMode, reverse: bool) {
    summaries.sort_by(|a, b| a.order_date(order).cmp(&b.order_date(order)));
    if reverse {
        summaries.reverse();
    }
}

// ============================================================================
// IssueIndex
// ============================================================================

/// The issues root folder plus the state table used for default filtering.
#[derive(Debug, Clone)]
pub struct IssueIndex {
    root: PathBuf,
    states: StateTable,
}

impl IssueIndex {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, states: StateTable) -> Self {
        Self {
            root: root.into(),
            states,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn states(&self) -> &StateTable {
        &self.states
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create a new, empty issue folder with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the issues root or the issue folder cannot be
    /// created.
    pub fn create_issue(&self) -> Result<(String, Mailbox)> {
        fs::create_dir_all(&self.root).map_err(|e| {
            TrackerError::storage(format!(
                "cannot create issues folder {}: {e}",
                self.root.display()
            ))
        })?;
        loop {
            let id = generate_issue_id(|id| self.root.join(id).exists());
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!(id = %id, "Created issue folder");
                    return Ok((id, Mailbox::open(dir)?));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(TrackerError::storage(format!(
                        "cannot create issue folder {}: {e}",
                        dir.display()
                    )));
                }
            }
        }
    }

    /// Names of all issue folders, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the root exists but cannot be listed.
    pub fn issue_ids(&self) -> Result<Vec<String>> {
        let listing = match fs::read_dir(&self.root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in listing {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            ids.push(name);
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve a full id or unique prefix to an issue id.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` for no match, `AmbiguousId` (with every
    /// candidate) for several, `Validation` for an empty input.
    pub fn resolve(&self, prefix: &str) -> Result<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Err(TrackerError::validation("id", "empty issue id"));
        }
        let ids = self.issue_ids()?;
        if ids.iter().any(|id| *id == prefix) {
            return Ok(prefix);
        }
        let matches: Vec<String> = ids
            .into_iter()
            .filter(|id| id.to_lowercase().starts_with(&prefix))
            .collect();
        match matches.len() {
            0 => Err(TrackerError::IssueNotFound { id: prefix }),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            _ => Err(TrackerError::AmbiguousId {
                partial: prefix,
                matches,
            }),
        }
    }

    /// Resolve `prefix` and load the issue.
    ///
    /// # Errors
    ///
    /// See [`IssueIndex::resolve`]; also propagates load errors.
    pub fn open_issue(&self, prefix: &str) -> Result<IssueHandle> {
        let id = self.resolve(prefix)?;
        IssueHandle::load(self.root.join(id))
    }

    /// Load every issue, creating missing staging folders as it goes.
    ///
    /// Issues that fail to load are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the root exists but cannot be listed.
    pub fn list_issues(&self) -> Result<Vec<IssueHandle>> {
        let mut issues = Vec::new();
        for id in self.issue_ids()? {
            match IssueHandle::load(self.root.join(&id)) {
                Ok(handle) => issues.push(handle),
                Err(e) => warn!(id = %id, error = %e, "Skipping unreadable issue"),
            }
        }
        Ok(issues)
    }

    /// Apply a list query.
    ///
    /// Issues without a root message are skipped.
    #[must_use]
    pub fn filter<'a>(&self, issues: &'a [IssueHandle], query: &ListQuery) -> Vec<&'a IssueHandle> {
        issues
            .iter()
            .filter(|issue| {
                let Some(props) = issue.properties() else {
                    debug!(id = %issue.id(), "Skipping issue without root message");
                    return false;
                };
                if query.predicates.is_empty() {
                    if !query.show_all
                        && props.get("state").is_some_and(|s| self.states.is_resolved(s))
                    {
                        return false;
                    }
                } else if !matches_all(&query.predicates, &props) {
                    return false;
                }
                query.date.is_none_or(|matcher| {
                    issue
                        .created()
                        .is_some_and(|d| matcher.matches(d.with_timezone(&Utc)))
                })
            })
            .collect()
    }

    /// Distinct values of `property` across `issues`, sorted.
    #[must_use]
    pub fn list_property_values(&self, issues: &[&IssueHandle], property: &str) -> Vec<String> {
        let values: BTreeSet<String> = issues
            .iter()
            .filter_map(|i| i.root().and_then(|r| r.header(property)))
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .collect();
        values.into_iter().collect()
    }

    /// Every header name used by any root message, de-duplicated ignoring
    /// case and sorted. The first spelling seen wins.
    #[must_use]
    pub fn all_property_names(&self, issues: &[IssueHandle]) -> Vec<String> {
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for root in issues.iter().filter_map(IssueHandle::root) {
            for (name, _) in root.headers() {
                names
                    .entry(name.to_lowercase())
                    .or_insert_with(|| name.clone());
            }
        }
        names.into_values().collect()
    }

    /// Issues whose root `query.property` matches `query.pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Regex` if the pattern is not a valid regular expression.
    pub fn search<'a>(
        &self,
        issues: &'a [IssueHandle],
        query: &FindQuery,
    ) -> Result<Vec<&'a IssueHandle>> {
        let regex = match query.mode {
            FindMode::Regex => Some(
                RegexBuilder::new(&query.pattern)
                    .case_insensitive(!query.case_sensitive)
                    .build()?,
            ),
            _ => None,
        };
        let needle = if query.case_sensitive {
            query.pattern.clone()
        } else {
            query.pattern.to_lowercase()
        };

        Ok(issues
            .iter()
            .filter(|issue| {
                let Some(value) = issue
                    .root()
                    .and_then(|r| r.header(&query.property))
                    .filter(|v| !v.is_empty())
                else {
                    return false;
                };
                if let Some(re) = &regex {
                    return re.is_match(value);
                }
                let hay = if query.case_sensitive {
                    value.to_string()
                } else {
                    value.to_lowercase()
                };
                match query.mode {
                    FindMode::Exact => hay == needle,
                    _ => hay.contains(&needle),
                }
            })
            .collect())
    }

    /// Summaries for `issues`, sorted.
    #[must_use]
    pub fn summaries(
        &self,
        issues: &[&IssueHandle],
        order: OrderMode,
        reverse: bool,
    ) -> Vec<IssueSummary> {
        let mut out: Vec<IssueSummary> = issues.iter().filter_map(|i| i.summary()).collect();
        sort_summaries(&mut out, order, reverse);
        out
    }
}

/// Keys of `mailbox` in date order; position 0 is the root.
#[must_use]
pub fn keys_by_date(mailbox: &Mailbox) -> Vec<String> {
    order_by_date(&mailbox.pairs())
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::root_message_id;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn add_issue(index: &IssueIndex, subject: &str, state: &str, date: &str) -> String {
        let (id, mut mailbox) = index.create_issue().unwrap();
        let mut msg = Message::new();
        msg.set_header("From", "jane@example.com");
        msg.set_header("Date", date);
        msg.set_header("State", state);
        msg.set_header("Subject", subject);
        msg.set_header("Message-Id", &root_message_id(&id));
        mailbox.with_lock(|mb| mb.add(&msg)).unwrap();
        id
    }

    fn index() -> (TempDir, IssueIndex) {
        let dir = TempDir::new().unwrap();
        let index = IssueIndex::new(dir.path().join(".issues"), StateTable::default());
        (dir, index)
    }

    const D1: &str = "Tue, 01 Jul 2025 10:00:00 +0000";
    const D2: &str = "Wed, 02 Jul 2025 10:00:00 +0000";

    #[test]
    fn test_missing_root_is_empty() {
        let (_dir, index) = index();
        assert!(!index.exists());
        assert!(index.list_issues().unwrap().is_empty());
        assert!(index.resolve("abc").unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_prefix() {
        let (_dir, index) = index();
        fs::create_dir_all(index.root().join("abc111")).unwrap();
        fs::create_dir_all(index.root().join("abc222")).unwrap();
        fs::create_dir_all(index.root().join("def333")).unwrap();
        fs::write(index.root().join(".filters"), "[x]\n").unwrap();

        assert_eq!(index.resolve("def").unwrap(), "def333");
        assert_eq!(index.resolve("ABC1").unwrap(), "abc111");
        match index.resolve("abc").unwrap_err() {
            TrackerError::AmbiguousId { matches, .. } => {
                assert_eq!(matches, vec!["abc111", "abc222"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(index.resolve(".fil").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_self_heals_layout() {
        let (_dir, index) = index();
        fs::create_dir_all(index.root().join("abc").join("cur")).unwrap();
        let issues = index.list_issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert!(index.root().join("abc").join("new").is_dir());
        assert!(index.root().join("abc").join("tmp").is_dir());
    }

    #[test]
    fn test_default_filter_hides_resolved() {
        let (_dir, index) = index();
        let open = add_issue(&index, "login fails", "new", D1);
        let fixed = add_issue(&index, "crash", "Fixed", D2);
        let issues = index.list_issues().unwrap();

        let shown: Vec<&str> = index
            .filter(&issues, &ListQuery::default())
            .iter()
            .map(|i| i.id())
            .collect();
        assert_eq!(shown, vec![open.as_str()]);

        let all = index.filter(
            &issues,
            &ListQuery {
                show_all: true,
                ..ListQuery::default()
            },
        );
        assert_eq!(all.len(), 2);

        let by_state = index.filter(
            &issues,
            &ListQuery {
                predicates: vec![Predicate::new("state", "Fixed")],
                ..ListQuery::default()
            },
        );
        assert_eq!(by_state.len(), 1);
        assert_eq!(by_state[0].id(), fixed);
    }

    #[test]
    fn test_malformed_issue_skipped() {
        let (_dir, index) = index();
        add_issue(&index, "ok", "new", D1);
        let (_, mut broken) = index.create_issue().unwrap();
        let mut reply = Message::new();
        reply.set_header("In-Reply-To", "<nowhere>");
        broken.add(&reply).unwrap();

        let issues = index.list_issues().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(
            index
                .filter(
                    &issues,
                    &ListQuery {
                        show_all: true,
                        ..ListQuery::default()
                    }
                )
                .len(),
            1
        );
    }

    #[test]
    fn test_date_predicate() {
        let (_dir, index) = index();
        add_issue(&index, "old", "new", D1);
        add_issue(&index, "newer", "new", D2);
        let issues = index.list_issues().unwrap();
        let hits = index.filter(
            &issues,
            &ListQuery {
                date: Some(DateMatcher::parse(">2025-07-02").unwrap()),
                ..ListQuery::default()
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].root().unwrap().subject(), "newer");
    }

    #[test]
    fn test_property_values_and_names() {
        let (_dir, index) = index();
        add_issue(&index, "a", "new", D1);
        add_issue(&index, "b", "fixed", D2);
        add_issue(&index, "c", "new", D2);
        add_issue(&index, "d", "", D2);
        let issues = index.list_issues().unwrap();
        let refs: Vec<&IssueHandle> = issues.iter().collect();
        assert_eq!(index.list_property_values(&refs, "STATE"), vec!["fixed", "new"]);
        assert_eq!(
            index.all_property_names(&issues),
            vec!["Date", "From", "Message-Id", "State", "Subject"]
        );
    }

    #[test]
    fn test_find_modes() {
        let (_dir, index) = index();
        add_issue(&index, "Login fails", "new", D1);
        let issues = index.list_issues().unwrap();

        let mut query = FindQuery::new("login");
        assert_eq!(index.search(&issues, &query).unwrap().len(), 1);

        query.case_sensitive = true;
        assert!(index.search(&issues, &query).unwrap().is_empty());

        let mut exact = FindQuery::new("login");
        exact.mode = FindMode::Exact;
        assert!(index.search(&issues, &exact).unwrap().is_empty());
        exact.pattern = "login FAILS".to_string();
        assert_eq!(index.search(&issues, &exact).unwrap().len(), 1);

        let mut regex = FindQuery::new("^log.*s$");
        regex.mode = FindMode::Regex;
        assert_eq!(index.search(&issues, &regex).unwrap().len(), 1);
        regex.pattern = "(".to_string();
        assert!(matches!(
            index.search(&issues, &regex),
            Err(TrackerError::Regex(_))
        ));

        let mut other = FindQuery::new("x");
        other.property = "priority".to_string();
        assert!(index.search(&issues, &other).unwrap().is_empty());
    }

    #[test]
    fn test_summaries_order() {
        let (_dir, index) = index();
        let late = add_issue(&index, "late", "new", D2);
        let early = add_issue(&index, "early", "new", D1);
        let issues = index.list_issues().unwrap();
        let refs: Vec<&IssueHandle> = issues.iter().collect();

        let asc = index.summaries(&refs, OrderMode::New, false);
        assert_eq!(asc[0].id, early);
        let desc = index.summaries(&refs, OrderMode::New, true);
        assert_eq!(desc[0].id, late);
        assert_eq!(asc[0].reply_count, 0);
        assert_eq!("LATEST".parse::<OrderMode>().unwrap(), OrderMode::Latest);
        assert!("oldest".parse::<OrderMode>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_default_and_all_partition(states in proptest::collection::vec(
            prop_oneof![Just("new"), Just("fixed"), Just("RESOLVED"), Just("wontfix")], 1..8)) {
            let (_dir, index) = index();
            for (i, state) in states.iter().enumerate() {
                add_issue(&index, &format!("issue {i}"), state, D1);
            }
            let issues = index.list_issues().unwrap();
            let open: BTreeSet<&str> = index
                .filter(&issues, &ListQuery::default())
                .iter()
                .map(|i| i.id())
                .collect();
            let all: BTreeSet<&str> = index
                .filter(&issues, &ListQuery { show_all: true, ..ListQuery::default() })
                .iter()
                .map(|i| i.id())
                .collect();
            let resolved: BTreeSet<&str> = all.difference(&open).copied().collect();

            prop_assert_eq!(all.len(), states.len());
            for issue in &issues {
                let state = issue.root().unwrap().header("state").unwrap();
                let is_resolved = index.states().is_resolved(state);
                prop_assert_eq!(resolved.contains(issue.id()), is_resolved);
                prop_assert_eq!(open.contains(issue.id()), !is_resolved);
            }
        }
    }
}
