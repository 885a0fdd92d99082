//! Usage accounting: seconds of active use attributable to a calendar day.
//!
//! A day is the half-open window `[00:00, 24:00)` in local wall-clock time.
//! Each session contributes the length of its intersection with that window,
//! with an open session extending to `now`. A session crossing midnight is
//! split between both days, and boundaries that merely touch contribute zero.
//!
//! Cached `duration_seconds` values are never used for totals; they exist for
//! display and diagnostics only.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::ledger::Ledger;
use crate::time::{day_window, parse_timestamp, seconds_between};
use crate::types::{AppUsageRecord, AppUsageTotal, Session};

/// Seconds shared by `[start, end)` and `[window_start, window_end)`.
pub fn overlap_seconds(
    start: NaiveDateTime,
    end: NaiveDateTime,
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
) -> i64 {
    let overlap_start = start.max(window_start);
    let overlap_end = end.min(window_end);
    if overlap_end > overlap_start {
        seconds_between(overlap_start, overlap_end)
    } else {
        0
    }
}

/// Start and effective end of a session, or `None` when a timestamp is unparseable.
fn session_bounds(session: &Session, now: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = match session.start() {
        Ok(start) => start,
        Err(err) => {
            tracing::warn!(session = %session.id, %err, "skipping session with bad start");
            return None;
        }
    };
    match session.end() {
        Ok(end) => Some((start, end.unwrap_or(now))),
        Err(err) => {
            tracing::warn!(session = %session.id, %err, "skipping session with bad end");
            None
        }
    }
}

/// Seconds of `session` that fall on `day`.
pub fn session_seconds_on(session: &Session, day: NaiveDate, now: NaiveDateTime) -> i64 {
    let (window_start, window_end) = day_window(day);
    session_bounds(session, now)
        .map_or(0, |(start, end)| overlap_seconds(start, end, window_start, window_end))
}

/// Whether `session` belongs in the log for `day`.
///
/// True when it overlaps the day, or when it is a zero-length session that
/// started inside the day (e.g. one opened this very second).
pub fn session_touches_day(session: &Session, day: NaiveDate, now: NaiveDateTime) -> bool {
    let (window_start, window_end) = day_window(day);
    session_bounds(session, now).is_some_and(|(start, end)| {
        start < window_end && (end > window_start || start >= window_start)
    })
}

/// Sum of every session's overlap with `day`.
pub fn total_seconds(sessions: &[Session], day: NaiveDate, now: NaiveDateTime) -> i64 {
    sessions
        .iter()
        .map(|session| session_seconds_on(session, day, now))
        .sum()
}

/// Total active seconds for `day`, read through the ledger.
///
/// The ledger may pre-filter candidates however it likes; the overlap
/// arithmetic here decides what counts.
pub fn total_seconds_for_date<L: Ledger>(
    ledger: &L,
    day: NaiveDate,
    now: NaiveDateTime,
) -> Result<i64, L::Error> {
    let sessions = ledger.sessions_overlapping(day, now)?;
    Ok(total_seconds(&sessions, day, now))
}

/// Cached duration for a session closing at `end_ts`.
///
/// Returns `None` when either timestamp is unparseable. Negative values (end
/// before start after a clock change) are kept as-is.
pub fn closed_duration(start_ts: &str, end_ts: &str) -> Option<i64> {
    let parsed = parse_timestamp(start_ts).and_then(|start| Ok((start, parse_timestamp(end_ts)?)));
    match parsed {
        Ok((start, end)) => {
            let duration = seconds_between(start, end);
            if duration < 0 {
                tracing::warn!(start_ts, end_ts, duration, "session ends before it starts");
            }
            Some(duration)
        }
        Err(err) => {
            tracing::warn!(%err, "cannot compute session duration");
            None
        }
    }
}

/// Per-app totals for `day`, largest first.
///
/// A record covers `[started_at, started_at + duration_seconds)`. Records that
/// merged non-contiguous runs are treated as one contiguous block.
pub fn app_usage_totals(records: &[AppUsageRecord], day: NaiveDate) -> Vec<AppUsageTotal> {
    let (window_start, window_end) = day_window(day);
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for record in records {
        let Ok(start) = parse_timestamp(&record.started_at) else {
            tracing::warn!(record = record.id, "skipping app usage with bad start");
            continue;
        };
        let end = start + TimeDelta::seconds(record.duration_seconds.max(0));
        let seconds = overlap_seconds(start, end, window_start, window_end);
        if seconds > 0 {
            *totals.entry(record.app_name.as_str()).or_default() += seconds;
        }
    }

    let mut totals: Vec<AppUsageTotal> = totals
        .into_iter()
        .map(|(app_name, total_seconds)| AppUsageTotal {
            app_name: app_name.to_string(),
            total_seconds,
        })
        .collect();
    totals.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| a.app_name.cmp(&b.app_name))
    });
    totals
}
