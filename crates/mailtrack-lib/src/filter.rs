//! Property predicates and saved filters.
//!
//! Saved filters live next to the issue folders in `.filter*` files using
//! INI syntax:
//!
//! ```text
//! # open bugs assigned to me
//! [mine]
//! state = new
//! assignee: jane
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::properties::PropertySet;

/// A single `key=value` property test.
///
/// An empty value matches only when the property is absent; a property
/// present with an empty value does not satisfy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub key: String,
    pub value: String,
}

impl Predicate {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there is no `=` or the key is empty.
    pub fn parse(text: &str) -> Result<Self> {
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| TrackerError::validation("property", format!("expected KEY=VALUE, got '{text}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(TrackerError::validation("property", "empty property name"));
        }
        Ok(Self::new(key, value.trim()))
    }

    #[must_use]
    pub fn requires_absence(&self) -> bool {
        self.value.is_empty()
    }

    #[must_use]
    pub fn matches(&self, props: &PropertySet) -> bool {
        match props.get(&self.key) {
            None => self.requires_absence(),
            Some(actual) => !self.requires_absence() && actual == self.value,
        }
    }
}

/// True when every predicate matches.
#[must_use]
pub fn matches_all(predicates: &[Predicate], props: &PropertySet) -> bool {
    predicates.iter().all(|p| p.matches(props))
}

/// Named predicate groups loaded from `.filter*` files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedFilters {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl SavedFilters {
    /// Load every `.filter*` file directly under `issues_root`, in sorted
    /// name order. A missing root yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a filter file exists but cannot be read.
    pub fn load(issues_root: &Path) -> Result<Self> {
        let mut filters = Self::default();
        let listing = match fs::read_dir(issues_root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(filters),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in listing {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".filter") && entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        for path in files {
            debug!(path = %path.display(), "Reading saved filters");
            filters.merge_ini(&fs::read_to_string(&path)?);
        }
        Ok(filters)
    }

    /// Merge INI text. Later definitions of a key override earlier ones.
    pub fn merge_ini(&mut self, text: &str) {
        let mut current: Option<String> = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                self.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some(section) = current.as_ref() else {
                continue;
            };
            let split = match (line.find('='), line.find(':')) {
                (Some(e), Some(c)) => Some(e.min(c)),
                (e, c) => e.or(c),
            };
            if let Some(at) = split {
                let key = line[..at].trim().to_lowercase();
                let value = line[at + 1..].trim().to_string();
                if !key.is_empty() {
                    self.sections
                        .entry(section.clone())
                        .or_default()
                        .insert(key, value);
                }
            }
        }
    }

    /// Predicates of filter `name`, in key order.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Vec<Predicate>> {
        self.sections.get(name).map(|section| {
            section
                .iter()
                .map(|(k, v)| Predicate::new(k.clone(), v.clone()))
                .collect()
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use tempfile::TempDir;

    fn props(raw: &[u8]) -> PropertySet {
        PropertySet::from_message(&Message::parse(raw))
    }

    #[test]
    fn test_predicate_parse() {
        assert_eq!(Predicate::parse("state=fixed").unwrap(), Predicate::new("state", "fixed"));
        assert_eq!(Predicate::parse("owner=").unwrap(), Predicate::new("owner", ""));
        assert!(Predicate::parse("state").is_err());
        assert!(Predicate::parse("=x").is_err());
    }

    #[test]
    fn test_predicate_key_case_insensitive_value_exact() {
        let p = props(b"State: fixed\n\n");
        assert!(Predicate::new("STATE", "fixed").matches(&p));
        assert!(!Predicate::new("state", "Fixed").matches(&p));
    }

    #[test]
    fn test_absent_versus_empty() {
        let with_empty = props(b"Owner: \nState: new\n\n");
        let without = props(b"State: new\n\n");
        let absent = Predicate::new("owner", "");
        assert!(absent.matches(&without));
        assert!(!absent.matches(&with_empty));
    }

    #[test]
    fn test_all_must_match() {
        let p = props(b"State: new\nPriority: high\n\n");
        let preds = vec![Predicate::new("state", "new"), Predicate::new("priority", "low")];
        assert!(!matches_all(&preds, &p));
        assert!(matches_all(&preds[..1], &p));
        assert!(matches_all(&[], &p));
    }

    #[test]
    fn test_load_filter_files_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".filters"),
            "# comment\n[mine]\nState = new\nassignee: jane\n\n[closed]\nstate=fixed\n",
        )
        .unwrap();
        fs::write(dir.path().join(".filter-local"), "[mine]\nassignee = bob\n").unwrap();
        fs::create_dir(dir.path().join("abc123")).unwrap();

        let filters = SavedFilters::load(dir.path()).unwrap();
        assert_eq!(filters.names().collect::<Vec<_>>(), vec!["closed", "mine"]);
        // ".filter-local" sorts before ".filters"
        assert_eq!(
            filters.get("mine").unwrap(),
            vec![Predicate::new("assignee", "jane"), Predicate::new("state", "new")]
        );
        assert!(filters.get("nope").is_none());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let filters = SavedFilters::load(&dir.path().join("missing")).unwrap();
        assert!(filters.is_empty());
    }
}
