//! Local wall-clock timestamps and calendar-day windows.
//!
//! All accounting happens on naive local time at second precision. Timestamps
//! are persisted as ISO 8601 strings without an offset (e.g.
//! `2025-01-15T10:30:00`), so lexicographic order matches chronological order
//! for rows written by this crate.

use std::cell::Cell;

use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, TimeDelta};
use thiserror::Error;

/// Storage format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Accepted input formats. `%.f` also matches a missing fractional part.
const PARSE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A stored timestamp could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid timestamp: {value:?}")]
pub struct TimestampError {
    pub value: String,
}

/// Formats a timestamp for storage.
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored ISO 8601 local timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, TimestampError> {
    let trimmed = value.trim();
    PARSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| TimestampError {
            value: value.to_string(),
        })
}

/// Local midnight at the start of `day`.
pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// The half-open window `[day 00:00, day+1 00:00)`.
pub fn day_window(day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let next = day.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (start_of_day(day), start_of_day(next))
}

/// Seconds between two timestamps, floored.
pub fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start).num_seconds()
}

/// Source of the current local wall-clock time.
pub trait Clock {
    /// Current local time, truncated to whole seconds.
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock in the local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local().trunc_subsecs(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Cell::new(start.trunc_subsecs(0)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        self.now.set(now.trunc_subsecs(0));
    }

    pub fn advance(&self, seconds: i64) {
        self.now.set(self.now.get() + TimeDelta::seconds(seconds));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }
}
