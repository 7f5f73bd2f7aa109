//! Command implementations, one module per subcommand.

pub mod add;
pub mod completions;
pub mod find;
pub mod list;
pub mod show;

use serde::Serialize;

use crate::error::Result;

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
