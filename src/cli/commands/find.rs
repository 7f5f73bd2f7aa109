//! Find command implementation.

use mailtrack_lib::{FindMode, FindQuery, FormatRules};

use crate::cli::{Context, FindArgs};
use crate::error::Result;
use crate::format::SummaryLine;

use super::print_json;

impl From<&FindArgs> for FindQuery {
    fn from(args: &FindArgs) -> Self {
        let mode = if args.regex {
            FindMode::Regex
        } else if args.exact {
            FindMode::Exact
        } else {
            FindMode::Substring
        };
        Self {
            pattern: args.query.clone(),
            property: args.property.clone(),
            mode,
            case_sensitive: args.case_sensitive,
        }
    }
}

/// Execute the find command.
///
/// Hits print in the fixed `id (replies) [state]: subject` layout.
///
/// # Errors
///
/// Returns an error if the issues folder cannot be read or the pattern is
/// not a valid regular expression.
pub fn execute(args: &FindArgs, ctx: &Context) -> Result<()> {
    let issues = ctx.index.list_issues()?;
    let hits = ctx.index.search(&issues, &FindQuery::from(args))?;

    let rules = FormatRules::default();
    let mut lines = Vec::with_capacity(hits.len());
    for summary in hits.iter().filter_map(|issue| issue.summary()) {
        let line = rules.render(&summary.display())?;
        lines.push(SummaryLine { summary, line });
    }

    if ctx.json {
        return print_json(&lines);
    }
    for entry in &lines {
        println!("{}", entry.line);
    }
    Ok(())
}
