//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use tl_core::{Clock, SystemClock};

/// Pre-compiled regex for relative day parsing.
static RELATIVE_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+days?\s+ago$").unwrap());

/// Conservative bound for relative day parsing (~1000 years).
const MAX_RELATIVE_DAYS: u64 = 1000 * 365;

/// Parse a day as either `YYYY-MM-DD` or a day relative to `today`.
///
/// Supports:
/// - ISO date: "2026-01-15"
/// - Relative: "today", "yesterday", "3 days ago"
pub fn parse_day(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    match s {
        "today" => return Ok(today),
        "yesterday" => return today.pred_opt().context("date out of range"),
        _ => {}
    }

    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(day);
    }

    let Some(caps) = RELATIVE_DAY_RE.captures(s) else {
        anyhow::bail!(
            "Invalid date: {s}. Use YYYY-MM-DD (e.g., 2026-01-15), 'today', 'yesterday' or 'N days ago'"
        );
    };

    let n: u64 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;
    if n > MAX_RELATIVE_DAYS {
        anyhow::bail!("Relative date value too large: {n} days");
    }

    today
        .checked_sub_days(chrono::Days::new(n))
        .context("date out of range")
}

/// Current local time at second precision.
pub fn now() -> NaiveDateTime {
    SystemClock.now()
}

/// Formats seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.unsigned_abs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{sign}{hours:02}:{minutes:02}:{secs:02}")
}
