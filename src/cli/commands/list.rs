//! List command implementation.
//!
//! Resolved issues are hidden unless `--all` is given or property
//! predicates are used. `-p KEY` without a value lists the distinct values
//! of KEY across the selected issues instead of the issues themselves.

use mailtrack_lib::{DateMatcher, IssueHandle, ListQuery, Predicate, SavedFilters};
use tracing::debug;

use crate::cli::{Context, ListArgs};
use crate::error::Result;
use crate::format::{PropertyValues, SummaryLine};

use super::print_json;

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the issues folder cannot be read, a predicate or
/// date expression is malformed, or a template fails to render.
pub fn execute(args: &ListArgs, ctx: &Context) -> Result<()> {
    let issues = ctx.index.list_issues()?;

    if args.all_properties {
        let names = ctx.index.all_property_names(&issues);
        if ctx.json {
            return print_json(&names);
        }
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let mut predicates = Vec::new();
    if let Some(name) = &args.filter {
        let saved = SavedFilters::load(ctx.index.root())?;
        match saved.get(name) {
            Some(found) => predicates.extend(found),
            None => eprintln!("No filter {name} defined"),
        }
    }
    let (given, listed) = split_properties(&args.property)?;
    predicates.extend(given);

    let query = ListQuery {
        predicates,
        show_all: args.all,
        date: args.date.as_deref().map(DateMatcher::parse).transpose()?,
    };
    let selected = ctx.index.filter(&issues, &query);
    debug!(total = issues.len(), selected = selected.len(), "Filtered issues");

    if listed.is_empty() {
        print_summaries(args, ctx, &selected)
    } else {
        print_values(ctx, &selected, &listed)
    }
}

/// Separate `KEY=VALUE` predicates from bare `KEY` value listings.
fn split_properties(raw: &[String]) -> Result<(Vec<Predicate>, Vec<String>)> {
    let mut predicates = Vec::new();
    let mut listed = Vec::new();
    for item in raw {
        if item.contains('=') {
            predicates.push(Predicate::parse(item)?);
        } else if !item.trim().is_empty() {
            listed.push(item.trim().to_string());
        }
    }
    Ok((predicates, listed))
}

fn print_summaries(args: &ListArgs, ctx: &Context, selected: &[&IssueHandle]) -> Result<()> {
    let rules = ctx.config.format_rules()?;
    let summaries = ctx.index.summaries(selected, args.order, args.reverse);

    let mut lines = Vec::with_capacity(summaries.len());
    for summary in summaries {
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

fn print_values(ctx: &Context, selected: &[&IssueHandle], listed: &[String]) -> Result<()> {
    let groups: Vec<PropertyValues> = listed
        .iter()
        .map(|property| PropertyValues {
            property: property.clone(),
            values: ctx.index.list_property_values(selected, property),
        })
        .filter(|group| !group.values.is_empty())
        .collect();

    if ctx.json {
        return print_json(&groups);
    }
    for group in &groups {
        println!("{}:", group.property);
        for value in &group.values {
            println!("  {value}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_properties() {
        let raw = vec![
            "state=fixed".to_string(),
            "owner".to_string(),
            "milestone=".to_string(),
            " ".to_string(),
        ];
        let (predicates, listed) = split_properties(&raw).unwrap();
        assert_eq!(predicates.len(), 2);
        assert!(predicates[1].requires_absence());
        assert_eq!(listed, vec!["owner"]);
    }
}
