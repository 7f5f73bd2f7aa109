//! Diagnostic logging setup.
//!
//! Logs go to stderr so command output on stdout stays clean. `MAILTRACK_LOG`
//! takes an `EnvFilter` directive and overrides the verbosity flags;
//! `MAILTRACK_LOG_FORMAT=json` switches to JSON lines.

use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "MAILTRACK_LOG";
/// Environment variable selecting the log line format.
pub const LOG_FORMAT_ENV: &str = "MAILTRACK_LOG_FORMAT";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Default level for the verbosity flags.
#[must_use]
pub const fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbose: u8, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level_for(verbose, quiet)))
}

/// Install the global subscriber.
///
/// `format` of `None` reads `MAILTRACK_LOG_FORMAT`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    format: Option<LogFormat>,
) -> Result<(), InitError> {
    let filter = build_filter(verbose, quiet);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format.unwrap_or_else(LogFormat::from_env) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.without_time().try_init(),
    }
}

/// Logging for tests; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(2, false))
        .with_test_writer()
        .try_init();
}
