//! State table: state names mapped to the header values they accept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NEW: &str = "new";
pub const RESOLVED: &str = "resolved";

/// Immutable mapping of state name to accepted `State` header values.
///
/// The `resolved` entry drives the default list filter: issues whose root
/// `State` matches one of its values (case-insensitively) are hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTable {
    default_state: String,
    states: BTreeMap<String, Vec<String>>,
}

impl Default for StateTable {
    fn default() -> Self {
        let mut states = BTreeMap::new();
        states.insert(NEW.to_string(), vec!["new".to_string()]);
        states.insert(
            RESOLVED.to_string(),
            vec!["fixed".to_string(), "resolved".to_string()],
        );
        Self {
            default_state: NEW.to_string(),
            states,
        }
    }
}

impl StateTable {
    /// Build a table. A missing `resolved` entry falls back to the built-in
    /// values so the default filter keeps working.
    #[must_use]
    pub fn new(default_state: impl Into<String>, states: BTreeMap<String, Vec<String>>) -> Self {
        let mut table = Self {
            default_state: default_state.into(),
            states,
        };
        if !table.states.contains_key(RESOLVED) {
            table.states.insert(
                RESOLVED.to_string(),
                Self::default().states.remove(RESOLVED).unwrap_or_default(),
            );
        }
        table
    }

    /// State written into the seed text of a new issue.
    #[must_use]
    pub fn default_state(&self) -> &str {
        &self.default_state
    }

    #[must_use]
    pub fn values(&self, state: &str) -> &[String] {
        self.states.get(state).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn resolved_values(&self) -> &[String] {
        self.values(RESOLVED)
    }

    /// True when `value` is one of the resolved values, ignoring case.
    #[must_use]
    pub fn is_resolved(&self, value: &str) -> bool {
        let value = value.trim();
        self.resolved_values()
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value))
    }

    /// State name whose values include `value`, ignoring case.
    #[must_use]
    pub fn state_of(&self, value: &str) -> Option<&str> {
        let value = value.trim();
        self.states
            .iter()
            .find(|(_, vals)| vals.iter().any(|v| v.eq_ignore_ascii_case(value)))
            .map(|(name, _)| name.as_str())
    }
}
