//! Persisted record types.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::{TimestampError, parse_timestamp};

/// Ledger-assigned session identifier.
///
/// Identifiers are assigned monotonically by storage and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One contiguous interval of permitted use.
///
/// Timestamps are kept as stored so that malformed rows can still be listed;
/// use [`Session::start`] and [`Session::end`] to parse them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub start_ts: String,
    /// `None` while the session is open.
    pub end_ts: Option<String>,
    /// Cached length in seconds; `None` while open or when a timestamp was unparseable.
    pub duration_seconds: Option<i64>,
}

impl Session {
    pub const fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }

    pub fn start(&self) -> Result<NaiveDateTime, TimestampError> {
        parse_timestamp(&self.start_ts)
    }

    /// Parsed end time, `Ok(None)` for the open session.
    pub fn end(&self) -> Result<Option<NaiveDateTime>, TimestampError> {
        self.end_ts.as_deref().map(parse_timestamp).transpose()
    }
}

/// Accumulated foreground time for one application within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageRecord {
    pub id: i64,
    pub session_id: SessionId,
    pub app_name: String,
    /// Timestamp of the first sample in this run.
    pub started_at: String,
    pub duration_seconds: i64,
}

/// Per-application total for a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageTotal {
    pub app_name: String,
    pub total_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(start: &str, end: Option<&str>) -> Session {
        Session {
            id: SessionId::new(1),
            start_ts: start.to_string(),
            end_ts: end.map(str::to_string),
            duration_seconds: None,
        }
    }

    #[test]
    fn open_session_has_no_end() {
        let open = session("2025-01-01T10:00:00", None);
        assert!(open.is_open());
        assert_eq!(open.end().unwrap(), None);
    }

    #[test]
    fn malformed_end_is_reported() {
        let broken = session("2025-01-01T10:00:00", Some("yesterday-ish"));
        assert!(!broken.is_open());
        assert!(broken.end().is_err());
        assert!(broken.start().is_ok());
    }

    #[test]
    fn session_id_serializes_as_integer() {
        let json = serde_json::to_string(&SessionId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
