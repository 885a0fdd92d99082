//! Session lifecycle: start, stop, crash recovery and midnight splitting.
//!
//! The controller is the single owner of "which session is current". Every
//! decision is made by a pure planning function and then applied against the
//! ledger, so the date logic can be tested without storage.

use chrono::{NaiveDate, NaiveDateTime};

use crate::ledger::Ledger;
use crate::time::start_of_day;
use crate::types::SessionId;

/// The session currently owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: SessionId,
    pub start: NaiveDateTime,
}

/// What a tick has to do about the calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    /// Still the same day.
    Unchanged,
    /// The date moved but there is nothing to split.
    DateChanged { date: NaiveDate },
    /// Close `session` at `boundary` and open its continuation there.
    Split {
        date: NaiveDate,
        session: SessionId,
        boundary: NaiveDateTime,
    },
}

/// Decides how to react to the clock reading `now`.
///
/// A running session is split only when the new midnight falls strictly after
/// its start. When the clock moves backwards, or forward again past a date it
/// already left, the recorded date follows it but the session is left alone
/// rather than being closed before it started.
pub fn plan_rollover(
    current: Option<ActiveSession>,
    current_date: NaiveDate,
    now: NaiveDateTime,
) -> Rollover {
    let date = now.date();
    if date == current_date {
        return Rollover::Unchanged;
    }
    match current {
        Some(active) if date > current_date && start_of_day(date) > active.start => {
            Rollover::Split {
                date,
                session: active.id,
                boundary: start_of_day(date),
            }
        }
        _ => Rollover::DateChanged { date },
    }
}

#[derive(Debug, Clone)]
pub struct SessionController {
    current: Option<ActiveSession>,
    current_date: NaiveDate,
}

impl SessionController {
    pub const fn new(today: NaiveDate) -> Self {
        Self {
            current: None,
            current_date: today,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub const fn current(&self) -> Option<ActiveSession> {
        self.current
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.current.map(|active| active.id)
    }

    /// Last date seen by [`Self::rollover_if_date_changed`].
    pub const fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    /// Opens a session at `now`. Returns `false` if one was already running.
    pub fn start<L: Ledger>(&mut self, ledger: &mut L, now: NaiveDateTime) -> Result<bool, L::Error> {
        if self.current.is_some() {
            return Ok(false);
        }
        let id = ledger.create_session(now)?;
        tracing::info!(session = %id, start = %now, "session started");
        self.current = Some(ActiveSession { id, start: now });
        Ok(true)
    }

    /// Closes the current session at `now`. Returns `false` if none was running.
    ///
    /// On storage failure the session stays current so the caller can retry.
    pub fn stop<L: Ledger>(&mut self, ledger: &mut L, now: NaiveDateTime) -> Result<bool, L::Error> {
        let Some(active) = self.current else {
            return Ok(false);
        };
        ledger.close_session(active.id, now)?;
        tracing::info!(session = %active.id, end = %now, "session stopped");
        self.current = None;
        Ok(true)
    }

    /// Adopts a session left open by a previous process.
    ///
    /// The original start time is preserved. An open session whose start cannot
    /// be parsed is closed at `now` instead, so that a fresh session can be
    /// started without leaving two open rows behind.
    pub fn resume_if_open<L: Ledger>(
        &mut self,
        ledger: &mut L,
        now: NaiveDateTime,
    ) -> Result<bool, L::Error> {
        if self.current.is_some() {
            return Ok(true);
        }
        let Some(open) = ledger.open_session()? else {
            return Ok(false);
        };
        match open.start() {
            Ok(start) => {
                tracing::info!(session = %open.id, %start, "resuming open session");
                self.current = Some(ActiveSession { id: open.id, start });
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(session = %open.id, %err, "closing unreadable open session");
                ledger.close_session(open.id, now)?;
                Ok(false)
            }
        }
    }

    /// Splits the running session at midnight when the date has changed.
    ///
    /// The old session ends and the new one begins at the same instant, so
    /// the two are contiguous with no gap and no overlap.
    pub fn rollover_if_date_changed<L: Ledger>(
        &mut self,
        ledger: &mut L,
        now: NaiveDateTime,
    ) -> Result<Rollover, L::Error> {
        let plan = plan_rollover(self.current, self.current_date, now);
        match plan {
            Rollover::Unchanged => {}
            Rollover::DateChanged { date } => {
                tracing::debug!(from = %self.current_date, to = %date, "date changed");
                self.current_date = date;
            }
            Rollover::Split {
                date,
                session,
                boundary,
            } => {
                ledger.close_session(session, boundary)?;
                self.current = None;
                self.current_date = date;
                let id = ledger.create_session(boundary)?;
                tracing::info!(closed = %session, opened = %id, %boundary, "split session at midnight");
                self.current = Some(ActiveSession {
                    id,
                    start: boundary,
                });
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLedger;
    use crate::time::parse_timestamp;

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn start_is_idempotent() {
        let mut ledger = MemoryLedger::default();
        let now = ts("2025-01-01T10:00:00");
        let mut controller = SessionController::new(now.date());

        assert!(controller.start(&mut ledger, now).unwrap());
        assert!(!controller.start(&mut ledger, now).unwrap());
        assert_eq!(ledger.sessions.len(), 1);
        assert_eq!(controller.current().unwrap().start, now);
    }

    #[test]
    fn stop_closes_and_clears() {
        let mut ledger = MemoryLedger::default();
        let mut controller = SessionController::new(ts("2025-01-01T10:00:00").date());
        controller.start(&mut ledger, ts("2025-01-01T10:00:00")).unwrap();

        assert!(controller.stop(&mut ledger, ts("2025-01-01T10:30:00")).unwrap());
        assert!(!controller.is_running());
        assert!(!controller.stop(&mut ledger, ts("2025-01-01T10:31:00")).unwrap());

        let session = &ledger.sessions[0];
        assert_eq!(session.end_ts.as_deref(), Some("2025-01-01T10:30:00"));
        assert_eq!(session.duration_seconds, Some(1800));
    }

    #[test]
    fn failed_stop_keeps_session_current() {
        let mut ledger = MemoryLedger::default();
        let mut controller = SessionController::new(ts("2025-01-01T10:00:00").date());
        controller.start(&mut ledger, ts("2025-01-01T10:00:00")).unwrap();

        ledger.fail_writes = true;
        assert!(controller.stop(&mut ledger, ts("2025-01-01T11:00:00")).is_err());
        assert!(controller.is_running());

        ledger.fail_writes = false;
        assert!(controller.stop(&mut ledger, ts("2025-01-01T11:00:00")).unwrap());
    }

    #[test]
    fn resume_preserves_original_start() {
        let mut ledger = MemoryLedger::default();
        let id = ledger.create_session(ts("2025-01-01T07:45:00")).unwrap();

        let now = ts("2025-01-01T09:00:00");
        let mut controller = SessionController::new(now.date());
        assert!(controller.resume_if_open(&mut ledger, now).unwrap());

        let active = controller.current().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.start, ts("2025-01-01T07:45:00"));
        assert_eq!(ledger.sessions.len(), 1);
        assert_eq!(ledger.sessions[0].start_ts, "2025-01-01T07:45:00");
    }

    #[test]
    fn resume_without_open_session_does_nothing() {
        let mut ledger = MemoryLedger::default();
        let now = ts("2025-01-01T09:00:00");
        let mut controller = SessionController::new(now.date());
        assert!(!controller.resume_if_open(&mut ledger, now).unwrap());
        assert!(ledger.sessions.is_empty());
    }

    #[test]
    fn resume_closes_unreadable_open_session() {
        let mut ledger = MemoryLedger::default();
        ledger.create_session(ts("2025-01-01T07:45:00")).unwrap();
        ledger.sessions[0].start_ts = "corrupted".to_string();

        let now = ts("2025-01-01T09:00:00");
        let mut controller = SessionController::new(now.date());
        assert!(!controller.resume_if_open(&mut ledger, now).unwrap());
        assert!(!controller.is_running());
        assert_eq!(ledger.sessions[0].end_ts.as_deref(), Some("2025-01-01T09:00:00"));
        assert_eq!(ledger.sessions[0].duration_seconds, None);
    }

    #[test]
    fn rollover_splits_running_session_at_midnight() {
        let mut ledger = MemoryLedger::default();
        let mut controller = SessionController::new(ts("2025-01-01T10:00:00").date());
        controller.start(&mut ledger, ts("2025-01-01T10:00:00")).unwrap();

        let same_day = controller
            .rollover_if_date_changed(&mut ledger, ts("2025-01-01T23:59:59"))
            .unwrap();
        assert_eq!(same_day, Rollover::Unchanged);

        let plan = controller
            .rollover_if_date_changed(&mut ledger, ts("2025-01-02T00:00:01"))
            .unwrap();
        assert!(matches!(plan, Rollover::Split { .. }));

        assert_eq!(ledger.sessions.len(), 2);
        let first = &ledger.sessions[0];
        let second = &ledger.sessions[1];
        assert_eq!(first.end_ts.as_deref(), Some("2025-01-02T00:00:00"));
        assert_eq!(first.duration_seconds, Some(14 * 3600));
        assert_eq!(second.start_ts, "2025-01-02T00:00:00");
        assert!(second.is_open());
        assert_eq!(first.end_ts.as_deref(), Some(second.start_ts.as_str()));

        assert_eq!(controller.current_id(), Some(second.id));
        assert_eq!(controller.current_date(), ts("2025-01-02T00:00:00").date());
    }

    #[test]
    fn rollover_while_stopped_only_moves_date() {
        let mut ledger = MemoryLedger::default();
        let mut controller = SessionController::new(ts("2025-01-01T10:00:00").date());

        let plan = controller
            .rollover_if_date_changed(&mut ledger, ts("2025-01-02T08:00:00"))
            .unwrap();
        assert_eq!(
            plan,
            Rollover::DateChanged {
                date: ts("2025-01-02T08:00:00").date()
            }
        );
        assert!(ledger.sessions.is_empty());
        assert_eq!(controller.current_date(), ts("2025-01-02T08:00:00").date());
    }

    #[test]
    fn backwards_clock_does_not_split() {
        let current = ActiveSession {
            id: SessionId::new(7),
            start: ts("2025-01-02T09:00:00"),
        };
        let plan = plan_rollover(
            Some(current),
            ts("2025-01-02T09:00:00").date(),
            ts("2025-01-01T22:00:00"),
        );
        assert_eq!(
            plan,
            Rollover::DateChanged {
                date: ts("2025-01-01T22:00:00").date()
            }
        );
    }

    #[test]
    fn clock_corrected_forward_after_going_back_does_not_split() {
        let mut ledger = MemoryLedger::default();
        let start = ts("2025-01-02T09:00:00");
        let mut controller = SessionController::new(start.date());
        controller.start(&mut ledger, start).unwrap();

        let back = controller
            .rollover_if_date_changed(&mut ledger, ts("2025-01-01T23:59:50"))
            .unwrap();
        assert!(matches!(back, Rollover::DateChanged { .. }));

        let forward = controller
            .rollover_if_date_changed(&mut ledger, ts("2025-01-02T09:05:00"))
            .unwrap();
        assert_eq!(
            forward,
            Rollover::DateChanged {
                date: start.date()
            }
        );
        assert_eq!(ledger.sessions.len(), 1);
        assert!(ledger.sessions[0].is_open());
        assert_eq!(controller.current().unwrap().start, start);

        let total =
            crate::accounting::total_seconds_for_date(&ledger, start.date(), ts("2025-01-02T09:05:00"))
                .unwrap();
        assert_eq!(total, 300);
    }

    #[test]
    fn multi_day_jump_splits_at_newest_midnight() {
        let current = ActiveSession {
            id: SessionId::new(3),
            start: ts("2025-01-01T20:00:00"),
        };
        let plan = plan_rollover(
            Some(current),
            ts("2025-01-01T20:00:00").date(),
            ts("2025-01-04T06:00:00"),
        );
        assert_eq!(
            plan,
            Rollover::Split {
                date: ts("2025-01-04T06:00:00").date(),
                session: SessionId::new(3),
                boundary: ts("2025-01-04T00:00:00"),
            }
        );
    }
}
