//! Property/Format Engine.
//!
//! [`PropertySet`] is the storage-level view of a root message's headers:
//! lookups are case-insensitive and a missing key is `None`. The
//! formatting layer wraps it in [`DisplayProperties`], which adds `id`,
//! `len` and ANSI helpers and maps missing keys to an empty string only at
//! render time.
//!
//! Summary lines are `minijinja` templates chosen by [`FormatRules`]: the
//! first rule whose `key*value&...` condition fully matches wins, else the
//! default template applies.

use std::fmt;
use std::sync::Arc;

use minijinja::value::{Enumerator, Object, Value};
use minijinja::Environment;
use serde::ser::{Serialize, SerializeMap, Serializer};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::{Result, TrackerError};
use crate::message::Message;

/// Default one-line summary template.
pub const DEFAULT_TEMPLATE: &str = "{{ id }} ({{ len|rjust(3) }}) [{{ state }}]: {{ subject }}";

/// ANSI escape helpers available to templates.
pub const ANSI: &[(&str, &str)] = &[
    ("reset", "\x1b[0m"),
    ("bold", "\x1b[1m"),
    ("dark", "\x1b[2m"),
    ("underline", "\x1b[4m"),
    ("blink", "\x1b[5m"),
    ("reverse", "\x1b[7m"),
    ("concealed", "\x1b[8m"),
    ("grey", "\x1b[30m"),
    ("red", "\x1b[31m"),
    ("green", "\x1b[32m"),
    ("yellow", "\x1b[33m"),
    ("blue", "\x1b[34m"),
    ("magenta", "\x1b[35m"),
    ("cyan", "\x1b[36m"),
    ("white", "\x1b[37m"),
];

// ============================================================================
// PropertySet
// ============================================================================

/// Ordered, case-insensitive header properties of a root message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    entries: Vec<(String, String)>,
}

impl PropertySet {
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            entries: message.headers().to_vec(),
        }
    }

    /// First value of `key`, ignoring case. `None` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Header names in stored order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// DisplayProperties
// ============================================================================

/// Render-time view: every lookup yields a string.
#[derive(Debug, Clone)]
pub struct DisplayProperties {
    id: String,
    len: usize,
    props: PropertySet,
}

impl DisplayProperties {
    #[must_use]
    pub fn new(id: impl Into<String>, len: usize, props: PropertySet) -> Self {
        Self {
            id: id.into(),
            len,
            props,
        }
    }

    /// `id`, `len`, then headers, then ANSI helpers; anything else is `None`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        if key.eq_ignore_ascii_case("id") {
            return Some(self.id.clone());
        }
        if key.eq_ignore_ascii_case("len") {
            return Some(self.len.to_string());
        }
        if let Some(value) = self.props.get(key) {
            return Some(value.to_string());
        }
        ANSI.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, code)| (*code).to_string())
    }

    /// Like [`Self::lookup`], with missing keys rendered as `""`.
    #[must_use]
    pub fn get(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_default()
    }

    #[must_use]
    pub fn properties(&self) -> &PropertySet {
        &self.props
    }
}

impl fmt::Display for DisplayProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Template context object resolving names through [`DisplayProperties`].
#[derive(Debug)]
struct TemplateContext(DisplayProperties);

impl Object for TemplateContext {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        key.as_str()
            .and_then(|name| self.0.lookup(name))
            .map(Value::from)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let mut names: Vec<Value> = vec![Value::from("id"), Value::from("len")];
        names.extend(self.0.props.names().map(|n| Value::from(n.to_lowercase())));
        Enumerator::Values(names)
    }
}

// ============================================================================
// Templates
// ============================================================================

/// One conditional template: `key*value[&key*value...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRule {
    conditions: Vec<(String, String)>,
    template: String,
}

impl FormatRule {
    /// Parse a rule condition.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a clause lacks `*` or has an empty key.
    pub fn new(when: &str, template: impl Into<String>) -> Result<Self> {
        let mut conditions = Vec::new();
        for clause in when.split('&') {
            let (key, value) = clause.split_once('*').ok_or_else(|| {
                TrackerError::validation("format.rules", format!("expected key*value, got '{clause}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TrackerError::validation("format.rules", "empty key in condition"));
            }
            conditions.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self {
            conditions,
            template: template.into(),
        })
    }

    #[must_use]
    pub fn matches(&self, props: &DisplayProperties) -> bool {
        self.conditions.iter().all(|(k, v)| props.get(k) == *v)
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

/// Ordered conditional templates plus the default.
#[derive(Debug, Clone)]
pub struct FormatRules {
    default: String,
    rules: Vec<FormatRule>,
    env: Environment<'static>,
}

impl Default for FormatRules {
    fn default() -> Self {
        Self {
            default: DEFAULT_TEMPLATE.to_string(),
            rules: Vec::new(),
            env: template_env(),
        }
    }
}

impl FormatRules {
    /// Build and compile-check all templates.
    ///
    /// # Errors
    ///
    /// Returns `Template` if any template has a syntax error.
    pub fn new(default: impl Into<String>, rules: Vec<FormatRule>) -> Result<Self> {
        let this = Self {
            default: default.into(),
            rules,
            env: template_env(),
        };
        this.check(&this.default)?;
        for rule in &this.rules {
            this.check(&rule.template)?;
        }
        Ok(this)
    }

    fn check(&self, source: &str) -> Result<()> {
        self.env
            .template_from_str(source)
            .map(|_| ())
            .map_err(|e| TrackerError::Template(e.to_string()))
    }

    /// Template for `props`: first matching rule, else the default.
    #[must_use]
    pub fn select(&self, props: &DisplayProperties) -> &str {
        self.rules
            .iter()
            .find(|r| r.matches(props))
            .map_or(self.default.as_str(), FormatRule::template)
    }

    /// Render the summary line for `props`.
    ///
    /// # Errors
    ///
    /// Returns `Template` if rendering fails.
    pub fn render(&self, props: &DisplayProperties) -> Result<String> {
        let source = self.select(props);
        let ctx = Value::from_object(TemplateContext(props.clone()));
        self.env
            .render_str(source, ctx)
            .map_err(|e| TrackerError::Template(e.to_string()))
    }
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_filter("rjust", rjust);
    env.add_filter("ljust", ljust);
    env.add_filter("truncate_width", truncate_width);
    env
}

fn pad(width: usize, text: &str) -> String {
    " ".repeat(width.saturating_sub(UnicodeWidthStr::width(text)))
}

#[allow(clippy::needless_pass_by_value)] // minijinja filter signature
fn rjust(value: Value, width: usize) -> String {
    let text = value.to_string();
    format!("{}{text}", pad(width, &text))
}

#[allow(clippy::needless_pass_by_value)]
fn ljust(value: Value, width: usize) -> String {
    let text = value.to_string();
    format!("{text}{}", pad(width, &text))
}

/// Cut to at most `width` display columns.
#[allow(clippy::needless_pass_by_value)]
fn truncate_width(value: Value, width: usize) -> String {
    let text = value.to_string();
    let mut used = 0;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(raw: &[u8], len: usize) -> DisplayProperties {
        DisplayProperties::new(
            "8a3f",
            len,
            PropertySet::from_message(&Message::parse(raw)),
        )
    }

    #[test]
    fn test_property_lookup() {
        let props = PropertySet::from_message(&Message::parse(b"State: new\nSubject: hi\n\n"));
        assert_eq!(props.get("STATE"), Some("new"));
        assert_eq!(props.get("priority"), None);
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"State":"new","Subject":"hi"}"#);
    }

    #[test]
    fn test_display_missing_is_blank() {
        let d = display(b"State: new\n\n", 2);
        assert_eq!(d.get("priority"), "");
        assert_eq!(d.get("LEN"), "2");
        assert_eq!(d.get("red"), "\x1b[31m");
    }

    #[test]
    fn test_default_template() {
        let d = display(b"State: new\nSubject: login fails\n\n", 2);
        let line = FormatRules::default().render(&d).unwrap();
        assert_eq!(line, "8a3f (  2) [new]: login fails");
    }

    #[test]
    fn test_template_case_insensitive_and_missing() {
        let rules = FormatRules::new("{{ Subject }}|{{ PRIORITY }}|{{ priority|ljust(3) }}|", Vec::new()).unwrap();
        let d = display(b"subject: hi\n\n", 0);
        assert_eq!(rules.render(&d).unwrap(), "hi|||   |");
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = FormatRules::new(
            DEFAULT_TEMPLATE,
            vec![
                FormatRule::new("state*fixed&priority*high", "A {{ id }}").unwrap(),
                FormatRule::new("state*fixed", "B {{ id }}").unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(rules.render(&display(b"State: fixed\n\n", 0)).unwrap(), "B 8a3f");
        assert_eq!(
            rules
                .render(&display(b"State: fixed\nPriority: high\n\n", 0))
                .unwrap(),
            "A 8a3f"
        );
        assert!(rules.render(&display(b"State: new\n\n", 0)).unwrap().starts_with("8a3f"));
    }

    #[test]
    fn test_bad_rules_rejected() {
        assert!(FormatRule::new("state", "x").is_err());
        assert!(FormatRule::new("*x", "x").is_err());
        assert!(matches!(
            FormatRules::new("{{ id", Vec::new()),
            Err(TrackerError::Template(_))
        ));
    }

    #[test]
    fn test_width_filters() {
        assert_eq!(rjust(Value::from("ab"), 4), "  ab");
        assert_eq!(truncate_width(Value::from("日本語"), 5), "日本");
        assert_eq!(ljust(Value::from("日"), 3), "日 ");
    }
}
