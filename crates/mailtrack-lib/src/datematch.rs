//! Date-expression matcher for `list -d`.
//!
//! Supported forms (surrounding whitespace ignored):
//!
//! | Expression       | Matches                                   |
//! |------------------|-------------------------------------------|
//! | `<DATE`          | on or before DATE                         |
//! | `>DATE`          | on or after DATE                          |
//! | `DATE to DATE`   | inclusive range                           |
//! | `-N`             | within the last N days                    |
//! | `DATE`           | same calendar day (or same instant)       |
//!
//! `DATE` is `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, `MM/DD/YYYY` or an RFC
//! 2822 timestamp. Naive values are read as UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, TrackerError};

/// Compiled date predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatcher {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl DateMatcher {
    /// Compile `expr` relative to the current time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` if the expression is not understood.
    pub fn parse(expr: &str) -> Result<Self> {
        Self::parse_at(expr, Utc::now())
    }

    /// Compile `expr` with `now` as the reference for `-N`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` if the expression is not understood.
    pub fn parse_at(expr: &str, now: DateTime<Utc>) -> Result<Self> {
        let invalid = || TrackerError::InvalidDate {
            expr: expr.to_string(),
        };
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if let Some(rest) = trimmed.strip_prefix('<') {
            let (_, end) = parse_point(rest).ok_or_else(invalid)?;
            return Ok(Self {
                start: None,
                end: Some(end),
            });
        }
        if let Some(rest) = trimmed.strip_prefix('>') {
            let (start, _) = parse_point(rest).ok_or_else(invalid)?;
            return Ok(Self {
                start: Some(start),
                end: None,
            });
        }
        if let Some(rest) = trimmed.strip_prefix('-') {
            let days: i64 = rest.trim().parse().map_err(|_| invalid())?;
            if days < 0 {
                return Err(invalid());
            }
            let start = Duration::try_days(days)
                .and_then(|span| now.checked_sub_signed(span))
                .ok_or_else(invalid)?;
            return Ok(Self {
                start: Some(start),
                end: None,
            });
        }
        if let Some((from, to)) = trimmed.split_once(" to ") {
            let (start, _) = parse_point(from).ok_or_else(invalid)?;
            let (_, end) = parse_point(to).ok_or_else(invalid)?;
            if end < start {
                return Err(invalid());
            }
            return Ok(Self {
                start: Some(start),
                end: Some(end),
            });
        }

        let (start, end) = parse_point(trimmed).ok_or_else(invalid)?;
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    #[must_use]
    pub fn matches(&self, when: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| when >= s) && self.end.is_none_or(|e| when <= e)
    }
}

/// Parse a date into the inclusive instant range it denotes.
fn parse_point(text: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            let at = Utc.from_utc_datetime(&naive);
            return Some((at, at));
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(day) = NaiveDate::parse_from_str(text, fmt) {
            let start = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?);
            let end = start
                .checked_add_signed(Duration::days(1))?
                .checked_sub_signed(Duration::nanoseconds(1))?;
            return Some((start, end));
        }
    }
    DateTime::parse_from_rfc2822(text).ok().map(|dt| {
        let at = dt.with_timezone(&Utc);
        (at, at)
    })
}
