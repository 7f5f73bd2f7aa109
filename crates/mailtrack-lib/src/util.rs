//! Id generation, host identity and small text helpers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;

/// Tag embedded in every Message-Id this tracker writes.
pub const TRACKER_TAG: &str = "mailtrack";

static DELIVERY_COUNTER: AtomicU64 = AtomicU64::new(0);

static HOSTNAME: Lazy<String> = Lazy::new(|| sanitize_host(&raw_hostname()));

// ============================================================================
// Identity
// ============================================================================

#[cfg(unix)]
fn raw_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn raw_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Maildir forbids `/` and `:` in the host part of a file name.
fn sanitize_host(host: &str) -> String {
    let cleaned: String = host
        .trim()
        .chars()
        .map(|c| match c {
            '/' => '_',
            ':' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "localhost".to_string()
    } else {
        cleaned
    }
}

/// Host name of this machine, safe for use in file names and Message-Ids.
#[must_use]
pub fn hostname() -> &'static str {
    HOSTNAME.as_str()
}

// ============================================================================
// Id Generation
// ============================================================================

/// Random 64-bit value with the high bit set, as lowercase hex.
///
/// Always 16 characters wide.
#[must_use]
pub fn random_hex_id() -> String {
    let value: u64 = rand::rng().random_range((1u64 << 63)..=u64::MAX);
    format!("{value:x}")
}

/// Generate a fresh issue id that `exists` does not report as taken.
pub fn generate_issue_id<F>(exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    loop {
        let id = random_hex_id();
        if !exists(&id) {
            return id;
        }
    }
}

/// Build a Message-Id. Suffix `0` is reserved for the root message.
#[must_use]
pub fn message_id(issue_id: &str, suffix: &str) -> String {
    format!("<{issue_id}-{suffix}-{TRACKER_TAG}@{}>", hostname())
}

#[must_use]
pub fn root_message_id(issue_id: &str) -> String {
    message_id(issue_id, "0")
}

#[must_use]
pub fn reply_message_id(issue_id: &str) -> String {
    message_id(issue_id, &random_hex_id())
}

/// Unique delivery key: `secs.M<micros>P<pid>Q<counter>R<rand>.<host>`.
///
/// The process-wide counter keeps keys distinct within one process even when
/// the clock does not advance; pid and random suffix separate processes.
#[must_use]
pub fn delivery_key() -> String {
    let now = Utc::now();
    let seq = DELIVERY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::rng().random();
    format!(
        "{}.M{:06}P{}Q{}R{:08x}.{}",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        std::process::id(),
        seq,
        salt,
        hostname()
    )
}

/// Strip the maildir info suffix (`:2,FLAGS`) from a file name.
#[must_use]
pub fn key_from_filename(name: &str) -> &str {
    name.split_once(':').map_or(name, |(key, _)| key)
}

// ============================================================================
// Text Helpers
// ============================================================================

/// Compact user name: `"Jane Doe <jane.doe@example.com>"` becomes `jane`.
#[must_use]
pub fn short_user(user: &str) -> &str {
    let mut user = user;
    if let Some(at) = user.find('@') {
        user = &user[..at];
    }
    if let Some(lt) = user.find('<') {
        user = &user[lt + 1..];
    }
    if let Some(space) = user.find(' ') {
        user = &user[..space];
    }
    if let Some(dot) = user.find('.') {
        user = &user[..dot];
    }
    user
}

/// Human readable byte size, e.g. `  1.5M`, ` 12.0K`, `512B`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if bytes > MB {
        format!("{:5.1}M", bytes as f64 / MB as f64)
    } else if bytes > KB {
        format!("{:5.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

/// Prefix `Re: ` unless the subject already carries it.
#[must_use]
pub fn reply_subject(subject: &str) -> String {
    if subject.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("re: ")) {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}
