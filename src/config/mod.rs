//! Configuration management for `mailtrack`.
//!
//! Configuration is loaded from YAML files with support for:
//! - User config (`~/.config/mailtrack/config.yaml`)
//! - Repository config (`<repo>/.mailtrack.yaml`)
//! - Environment variable overrides
//! - Command-line overrides
//!
//! Later layers override earlier ones key by key.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use mailtrack_lib::properties::DEFAULT_TEMPLATE;
use mailtrack_lib::{FormatRule, FormatRules, StateTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MailtrackError, Result};

/// Repository-level config file name.
pub const REPO_CONFIG_FILE: &str = ".mailtrack.yaml";
/// Default issues folder, relative to the repository root.
pub const DEFAULT_ISSUES_DIR: &str = ".issues";
/// Default external mail reader.
pub const DEFAULT_READER: &str = "mutt -R -f";

/// One conditional summary template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// `key*value[&key*value...]`
    pub when: String,
    pub template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatLayer {
    pub default: Option<String>,
    pub rules: Option<Vec<RuleConfig>>,
}

/// A partially specified configuration, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub issues_dir: Option<PathBuf>,
    pub default_state: Option<String>,
    pub states: Option<BTreeMap<String, Vec<String>>>,
    pub format: Option<FormatLayer>,
    pub user: Option<String>,
    pub editor: Option<String>,
    pub reader: Option<String>,
}

impl ConfigLayer {
    /// Read a YAML layer. A missing file is an empty layer.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file exists but is not valid YAML for this
    /// schema, or `Io` if it cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        debug!(path = %path.display(), "Loading config layer");
        serde_yaml::from_str(&text).map_err(|source| MailtrackError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer built from environment variables, looked up through `env`.
    pub fn from_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        Self {
            issues_dir: non_empty("MAILTRACK_ISSUES_DIR").map(PathBuf::from),
            user: non_empty("MAILTRACK_USER"),
            editor: non_empty("MAILTRACK_EDITOR")
                .or_else(|| non_empty("VISUAL"))
                .or_else(|| non_empty("EDITOR")),
            ..Self::default()
        }
    }

    /// Overlay `other` on top of `self`.
    fn merge(&mut self, other: Self) {
        if other.issues_dir.is_some() {
            self.issues_dir = other.issues_dir;
        }
        if other.default_state.is_some() {
            self.default_state = other.default_state;
        }
        if other.states.is_some() {
            self.states = other.states;
        }
        if let Some(format) = other.format {
            let mine = self.format.get_or_insert_with(FormatLayer::default);
            if format.default.is_some() {
                mine.default = format.default;
            }
            if format.rules.is_some() {
                mine.rules = format.rules;
            }
        }
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.editor.is_some() {
            self.editor = other.editor;
        }
        if other.reader.is_some() {
            self.reader = other.reader;
        }
    }
}

/// Command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub issues_dir: Option<PathBuf>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub issues_dir: PathBuf,
    pub default_state: String,
    pub states: BTreeMap<String, Vec<String>>,
    pub format_default: String,
    pub format_rules: Vec<RuleConfig>,
    pub user: Option<String>,
    pub editor: Option<String>,
    pub reader: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_layer(ConfigLayer::default())
    }
}

impl Config {
    fn from_layer(layer: ConfigLayer) -> Self {
        let defaults = StateTable::default();
        let states = layer.states.unwrap_or_else(|| {
            ["new", "resolved"]
                .iter()
                .map(|s| ((*s).to_string(), defaults.values(s).to_vec()))
                .collect()
        });
        let format = layer.format.unwrap_or_default();
        Self {
            issues_dir: layer
                .issues_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ISSUES_DIR)),
            default_state: layer
                .default_state
                .unwrap_or_else(|| defaults.default_state().to_string()),
            states,
            format_default: format
                .default
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            format_rules: format.rules.unwrap_or_default(),
            user: layer.user,
            editor: layer.editor,
            reader: layer.reader.unwrap_or_else(|| DEFAULT_READER.to_string()),
        }
    }

    /// Load all layers for the repository at `repo_root`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a config file is malformed.
    pub fn load(repo_root: &Path, cli: &CliOverrides) -> Result<Self> {
        let user_file = dirs::config_dir().map(|d| d.join("mailtrack").join("config.yaml"));
        Self::load_from(
            user_file.as_deref(),
            repo_root,
            |key| std::env::var(key).ok(),
            cli,
        )
    }

    /// Load with explicit sources.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a config file is malformed.
    pub fn load_from<F>(
        user_file: Option<&Path>,
        repo_root: &Path,
        env: F,
        cli: &CliOverrides,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layer = ConfigLayer::default();
        if let Some(path) = user_file {
            layer.merge(ConfigLayer::from_file(path)?);
        }
        layer.merge(ConfigLayer::from_file(&repo_root.join(REPO_CONFIG_FILE))?);
        layer.merge(ConfigLayer::from_env(env));
        if let Some(dir) = &cli.issues_dir {
            layer.issues_dir = Some(dir.clone());
        }
        Ok(Self::from_layer(layer))
    }

    /// Absolute issues folder for `repo_root`.
    #[must_use]
    pub fn issues_path(&self, repo_root: &Path) -> PathBuf {
        if self.issues_dir.is_absolute() {
            self.issues_dir.clone()
        } else {
            repo_root.join(&self.issues_dir)
        }
    }

    #[must_use]
    pub fn state_table(&self) -> StateTable {
        StateTable::new(self.default_state.clone(), self.states.clone())
    }

    /// Compile the summary templates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` for a malformed rule condition or template.
    pub fn format_rules(&self) -> Result<FormatRules> {
        let mut rules = Vec::with_capacity(self.format_rules.len());
        for rule in &self.format_rules {
            rules.push(FormatRule::new(&rule.when, rule.template.clone()).map_err(|e| {
                MailtrackError::ConfigValue {
                    key: "format.rules".to_string(),
                    reason: e.to_string(),
                }
            })?);
        }
        FormatRules::new(self.format_default.clone(), rules).map_err(|e| {
            MailtrackError::ConfigValue {
                key: "format".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(None, dir.path(), no_env, &CliOverrides::default()).unwrap();
        assert_eq!(config.issues_dir, PathBuf::from(".issues"));
        assert_eq!(config.default_state, "new");
        assert!(config.state_table().is_resolved("fixed"));
        assert_eq!(config.issues_path(dir.path()), dir.path().join(".issues"));
        assert!(config.format_rules().is_ok());
    }

    #[test]
    fn test_layer_precedence() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.yaml");
        fs::write(
            &user,
            "issues_dir: bugs\nuser: User Level <u@example.com>\nformat:\n  default: \"{{ id }}\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(REPO_CONFIG_FILE),
            "issues_dir: tracker\ndefault_state: open\nformat:\n  rules:\n    - when: state*fixed\n      template: \"done {{ id }}\"\n",
        )
        .unwrap();
        let env: HashMap<&str, &str> = [("MAILTRACK_USER", "Env <e@example.com>"), ("EDITOR", "vi")]
            .into_iter()
            .collect();

        let config = Config::load_from(
            Some(&user),
            dir.path(),
            |k| env.get(k).map(ToString::to_string),
            &CliOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.issues_dir, PathBuf::from("tracker"));
        assert_eq!(config.default_state, "open");
        assert_eq!(config.format_default, "{{ id }}");
        assert_eq!(config.format_rules.len(), 1);
        assert_eq!(config.user.as_deref(), Some("Env <e@example.com>"));
        assert_eq!(config.editor.as_deref(), Some("vi"));

        let config = Config::load_from(
            Some(&user),
            dir.path(),
            no_env,
            &CliOverrides {
                issues_dir: Some(PathBuf::from("/abs/issues")),
            },
        )
        .unwrap();
        assert_eq!(config.issues_path(dir.path()), PathBuf::from("/abs/issues"));
    }

    #[test]
    fn test_editor_env_precedence() {
        let env: HashMap<&str, &str> = [("VISUAL", "code -w"), ("EDITOR", "vi")].into_iter().collect();
        let layer = ConfigLayer::from_env(|k| env.get(k).map(ToString::to_string));
        assert_eq!(layer.editor.as_deref(), Some("code -w"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(REPO_CONFIG_FILE), "issues_dir: [unclosed\n").unwrap();
        let err = Config::load_from(None, dir.path(), no_env, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, MailtrackError::Config { .. }));
    }

    #[test]
    fn test_bad_rule_reported() {
        let config = Config {
            format_rules: vec![RuleConfig {
                when: "state".to_string(),
                template: "x".to_string(),
            }],
            ..Config::default()
        };
        assert!(matches!(
            config.format_rules(),
            Err(MailtrackError::ConfigValue { .. })
        ));
    }
}
