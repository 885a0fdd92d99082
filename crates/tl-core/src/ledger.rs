//! Storage seam for sessions, app usage and settings.

use chrono::{NaiveDate, NaiveDateTime};

use crate::types::{Session, SessionId};

/// Durable store consumed by the session controller, tracker and enforcer.
///
/// Implementations are used from a single controlling thread. The "at most one
/// open session" and "one growing record per app" invariants are check-then-act
/// sequences, so shared backends must serialize every mutating call.
pub trait Ledger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Inserts an open session starting at `start`.
    fn create_session(&mut self, start: NaiveDateTime) -> Result<SessionId, Self::Error>;

    /// Sets the end time of a session and caches its duration.
    fn close_session(&mut self, id: SessionId, end: NaiveDateTime) -> Result<(), Self::Error>;

    /// The most recent session without an end time.
    fn open_session(&self) -> Result<Option<Session>, Self::Error>;

    /// Sessions intersecting `day`, newest start first. Open sessions extend to `now`.
    fn sessions_overlapping(
        &self,
        day: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Session>, Self::Error>;

    /// Adds `interval_seconds` to the latest record for `(session, app_name)`,
    /// creating one that started at `now` if none exists.
    fn record_app_usage(
        &mut self,
        session: SessionId,
        app_name: &str,
        interval_seconds: i64,
        now: NaiveDateTime,
    ) -> Result<(), Self::Error>;

    fn pin_configured(&self) -> Result<bool, Self::Error>;

    fn set_pin(&mut self, plain: &str) -> Result<(), Self::Error>;

    /// `false` for any input while no PIN is configured.
    fn verify_pin(&self, plain: &str) -> Result<bool, Self::Error>;
}
