//! Command-line interface for `mailtrack`.
//!
//! This module provides the CLI parsing and command routing using clap.

pub mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use mailtrack_lib::{IssueIndex, OrderMode, TrackerError};
use tracing::debug;

use crate::config::{CliOverrides, Config};
use crate::editor::ExternalEditor;
use crate::error::MailtrackError;
use crate::logging;
use crate::vcs::{self, Vcs};

/// `mailtrack` (mt) - issues as maildir threads inside your repository.
#[derive(Parser, Debug)]
#[command(name = "mt")]
#[command(
    author,
    version,
    about = "Issue tracker that stores issues as maildir threads inside your repository",
    long_about = None,
    after_help = "Issues live under .issues/ next to your code; new messages are staged in git."
)]
pub struct Cli {
    /// Output format: text (default) or json
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Issues folder (default: .issues under the repository root)
    #[arg(long, global = true, value_name = "DIR")]
    pub issues_dir: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List issues
    List(ListArgs),

    /// Add a new issue, or comment on an existing one
    Add(AddArgs),

    /// Show an issue and its comments
    Show(ShowArgs),

    /// Search issues by property
    Find(FindArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// List all issues (by default resolved issues are hidden)
    #[arg(short, long)]
    pub all: bool,

    /// Restrict to KEY=VALUE (KEY= for "no such property"), or list the
    /// values of KEY
    #[arg(short, long = "property", value_name = "KEY[=VALUE]")]
    pub property: Vec<String>,

    /// List every property name in use
    #[arg(long)]
    pub all_properties: bool,

    /// Order by creation (new) or most recent activity (latest)
    #[arg(short, long, default_value = "new", value_name = "new|latest")]
    pub order: OrderMode,

    /// Reverse the order
    #[arg(long)]
    pub reverse: bool,

    /// Restrict to issues created on a date ("<DATE", ">DATE", "A to B", "-N")
    #[arg(short, long, value_name = "DATE", allow_hyphen_values = true)]
    pub date: Option<String>,

    /// Restrict to a saved filter
    #[arg(short, long, value_name = "NAME")]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct AddArgs {
    /// Issue to comment on; omit to create a new issue
    pub id: Option<String>,

    /// Attach a file (repeatable)
    #[arg(short, long = "attach", value_name = "FILE")]
    pub attach: Vec<PathBuf>,

    /// Update a property of the issue (e.g. -p state=fixed)
    #[arg(short, long = "property", value_name = "KEY=VALUE")]
    pub property: Vec<String>,

    /// Do not open the editor for a property-only change
    #[arg(short, long = "no-property-comment")]
    pub no_property_comment: bool,

    /// Use TEXT as the subject and skip the editor
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Message to reply to (0 is the issue itself)
    #[arg(short, long, default_value_t = 0)]
    pub index: usize,

    /// Commit the issue folder afterwards
    #[arg(short, long)]
    pub commit: bool,
}

#[derive(Args, Debug, Default)]
pub struct ShowArgs {
    /// Issue id or unique prefix
    pub id: String,

    /// Print every comment
    #[arg(short, long)]
    pub all: bool,

    /// Skip body lines starting with PREFIX
    #[arg(short, long, default_value = ">", value_name = "PREFIX")]
    pub skip: String,

    /// Extract attachment number N of the shown message (repeatable)
    #[arg(short = 'x', long = "extract", value_name = "N")]
    pub extract: Vec<usize>,

    /// Message to show (0 is the issue itself)
    #[arg(short, long, default_value_t = 0)]
    pub index: usize,

    /// Folder for extracted attachments
    #[arg(short, long, default_value = "./tmp", value_name = "DIR")]
    pub output: PathBuf,

    /// Open the issue in the configured mail reader
    #[arg(long, alias = "mutt")]
    pub reader: bool,
}

#[derive(Args, Debug, Default)]
pub struct FindArgs {
    /// Text to look for
    pub query: String,

    /// Property to search
    #[arg(short, long, default_value = "subject")]
    pub property: String,

    /// Case sensitive search
    #[arg(short, long)]
    pub case_sensitive: bool,

    /// Treat QUERY as a regular expression (overrides --exact)
    #[arg(short, long)]
    pub regex: bool,

    /// Match the whole value
    #[arg(short, long)]
    pub exact: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

// ============================================================================
// Shared command context
// ============================================================================

/// Everything a command needs: resolved config, repository and issue index.
pub struct Context {
    pub config: Config,
    pub vcs: Box<dyn Vcs>,
    pub index: IssueIndex,
    pub json: bool,
    pub verbose: u8,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.vcs.root())
            .field("issues", &self.index.root())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build the context for `cwd`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is malformed.
    pub fn load(cwd: &Path, cli: &Cli) -> crate::error::Result<Self> {
        let root = vcs::repo_root(cwd);
        let overrides = CliOverrides {
            issues_dir: cli.issues_dir.clone(),
        };
        let config = Config::load(&root, &overrides)?;
        let vcs = vcs::discover(&root, config.user.as_deref());
        let index = IssueIndex::new(config.issues_path(vcs.root()), config.state_table());
        debug!(root = %vcs.root().display(), issues = %index.root().display(), "Context ready");
        Ok(Self {
            config,
            vcs,
            index,
            json: cli.json,
            verbose: cli.verbose,
        })
    }

    /// Author for new messages: configured user, then repository identity,
    /// then `$USER@host`.
    #[must_use]
    pub fn username(&self) -> String {
        self.config
            .user
            .clone()
            .or_else(|| self.vcs.username())
            .unwrap_or_else(|| {
                let login = std::env::var("USER")
                    .or_else(|_| std::env::var("USERNAME"))
                    .unwrap_or_else(|_| mailtrack_lib::util::TRACKER_TAG.to_string());
                format!("{login}@{}", mailtrack_lib::util::hostname())
            })
    }

    #[must_use]
    pub fn editor(&self) -> ExternalEditor {
        ExternalEditor::new(self.config.editor.as_deref())
    }
}

/// Print a warning for conditions that leave the command without effect.
pub fn warn_user(err: &TrackerError) {
    match err {
        TrackerError::AmbiguousId { matches, .. } => {
            eprintln!("Multiple choices:");
            for id in matches {
                eprintln!("  {id}");
            }
        }
        other => eprintln!("Warning: {other}"),
    }
}

/// Turn user-level failures into warnings; everything else propagates.
///
/// # Errors
///
/// Returns `err` unless it is a user error.
pub fn soften(result: crate::error::Result<()>) -> crate::error::Result<()> {
    match result {
        Err(MailtrackError::Tracker(e)) if e.is_user_error() => {
            warn_user(&e);
            Ok(())
        }
        other => other,
    }
}

/// Run the CLI.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet, None)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    if let Commands::Completions(args) = &cli.command {
        commands::completions::execute(args.shell, &mut std::io::stdout());
        return Ok(());
    }

    let cwd = std::env::current_dir()?;
    let ctx = Context::load(&cwd, &cli)?;

    let result = match &cli.command {
        Commands::List(args) => commands::list::execute(args, &ctx),
        Commands::Add(args) => commands::add::execute(args, &ctx, &ctx.editor()),
        Commands::Show(args) => commands::show::execute(args, &ctx),
        Commands::Find(args) => commands::find::execute(args, &ctx),
        Commands::Completions(_) => Ok(()),
    };
    soften(result)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from(["mt", "list", "-a", "-p", "state=fixed", "-o", "latest"]).unwrap();
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(args.all);
        assert_eq!(args.property, vec!["state=fixed"]);
        assert_eq!(args.order, OrderMode::Latest);

        assert!(Cli::try_parse_from(["mt", "list", "-o", "oldest"]).is_err());
    }

    #[test]
    fn test_parse_show_defaults() {
        let cli = Cli::try_parse_from(["mt", "show", "ab12", "-x", "1", "-x", "2"]).unwrap();
        let Commands::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.skip, ">");
        assert_eq!(args.extract, vec![1, 2]);
        assert_eq!(args.output, PathBuf::from("./tmp"));
        assert_eq!(args.index, 0);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mt", "find", "login", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_soften_user_errors() {
        let err: MailtrackError = TrackerError::IssueNotFound { id: "x".into() }.into();
        assert!(soften(Err(err)).is_ok());
        let err: MailtrackError = TrackerError::storage("disk full").into();
        assert!(soften(Err(err)).is_err());
    }
}
