//! In-memory ledger for unit tests.

use chrono::{NaiveDate, NaiveDateTime};

use crate::accounting::{closed_duration, session_touches_day};
use crate::ledger::Ledger;
use crate::pin::{hash_pin, pin_matches};
use crate::time::format_timestamp;
use crate::types::{AppUsageRecord, Session, SessionId};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    pub sessions: Vec<Session>,
    pub usage: Vec<AppUsageRecord>,
    pub pin_digest: Option<String>,
    /// When set, every mutating call fails.
    pub fail_writes: bool,
    /// When set, only session creation fails.
    pub fail_creates: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated storage failure")]
pub struct MemoryError;

impl MemoryLedger {
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    fn check_writable(&self) -> Result<(), MemoryError> {
        if self.fail_writes {
            Err(MemoryError)
        } else {
            Ok(())
        }
    }
}

impl Ledger for MemoryLedger {
    type Error = MemoryError;

    fn create_session(&mut self, start: NaiveDateTime) -> Result<SessionId, MemoryError> {
        self.check_writable()?;
        if self.fail_creates {
            return Err(MemoryError);
        }
        let id = SessionId::new(i64::try_from(self.sessions.len()).unwrap_or(i64::MAX) + 1);
        self.sessions.push(Session {
            id,
            start_ts: format_timestamp(start),
            end_ts: None,
            duration_seconds: None,
        });
        Ok(id)
    }

    fn close_session(&mut self, id: SessionId, end: NaiveDateTime) -> Result<(), MemoryError> {
        self.check_writable()?;
        let session = self
            .sessions
            .iter_mut()
            .find(|session| session.id == id)
            .ok_or(MemoryError)?;
        let end_ts = format_timestamp(end);
        session.duration_seconds = closed_duration(&session.start_ts, &end_ts);
        session.end_ts = Some(end_ts);
        Ok(())
    }

    fn open_session(&self) -> Result<Option<Session>, MemoryError> {
        Ok(self.sessions.iter().rev().find(|s| s.is_open()).cloned())
    }

    fn sessions_overlapping(
        &self,
        day: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Session>, MemoryError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|session| session_touches_day(session, day, now))
            .cloned()
            .collect();
        sessions.reverse();
        Ok(sessions)
    }

    fn record_app_usage(
        &mut self,
        session: SessionId,
        app_name: &str,
        interval_seconds: i64,
        now: NaiveDateTime,
    ) -> Result<(), MemoryError> {
        self.check_writable()?;
        if let Some(existing) = self
            .usage
            .iter_mut()
            .rev()
            .find(|r| r.session_id == session && r.app_name == app_name)
        {
            existing.duration_seconds += interval_seconds;
            return Ok(());
        }
        let id = i64::try_from(self.usage.len()).unwrap_or(i64::MAX) + 1;
        self.usage.push(AppUsageRecord {
            id,
            session_id: session,
            app_name: app_name.to_string(),
            started_at: format_timestamp(now),
            duration_seconds: interval_seconds,
        });
        Ok(())
    }

    fn pin_configured(&self) -> Result<bool, MemoryError> {
        Ok(self.pin_digest.is_some())
    }

    fn set_pin(&mut self, plain: &str) -> Result<(), MemoryError> {
        self.check_writable()?;
        self.pin_digest = Some(hash_pin(plain));
        Ok(())
    }

    fn verify_pin(&self, plain: &str) -> Result<bool, MemoryError> {
        Ok(pin_matches(self.pin_digest.as_deref(), plain))
    }
}
