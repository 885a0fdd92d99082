//! Storage layer for the time limiter.
//!
//! Provides persistence for sessions, per-session app usage and settings using
//! `rusqlite`, and implements [`tl_core::Ledger`] on top of it.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The engine drives it from a single thread. Several ledger operations are
//! check-then-act sequences (open-session lookup, app usage coalescing), so any
//! multi-threaded use must serialize mutating calls, e.g. behind a `Mutex<Database>`.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 local time without an offset
//! (e.g., `2024-01-15T10:30:00`), at second precision. Rows written by this
//! crate compare lexicographically in chronological order, which the range
//! pre-filters below rely on. Rows using a space separator are normalized to
//! `T` inside those comparisons. The exact overlap arithmetic is always redone
//! in `tl_core::accounting` after loading.
//!
//! ## Durations
//!
//! `sessions.duration_seconds` is a cache written when a session closes. It is
//! NULL while the session is open and also when either timestamp could not be
//! parsed.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use tl_core::time::day_window;
use tl_core::{
    AppUsageRecord, AppUsageTotal, Ledger, PIN_SETTING_KEY, Session, SessionId, app_usage_totals,
    closed_duration, format_timestamp, hash_pin, pin_matches, session_touches_day,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The referenced session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    /// A blank PIN was supplied.
    #[error("PIN cannot be empty")]
    EmptyPin,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

const SESSION_COLUMNS: &str = "id, start_ts, end_ts, duration_seconds";
const APP_USAGE_COLUMNS: &str = "id, session_id, app_name, started_at, duration_seconds";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::new(row.get(0)?),
        start_ts: row.get(1)?,
        end_ts: row.get(2)?,
        duration_seconds: row.get(3)?,
    })
}

fn app_usage_from_row(row: &Row<'_>) -> rusqlite::Result<AppUsageRecord> {
    Ok(AppUsageRecord {
        id: row.get(0)?,
        session_id: SessionId::new(row.get(1)?),
        app_name: row.get(2)?,
        started_at: row.get(3)?,
        duration_seconds: row.get(4)?,
    })
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Sessions: contiguous intervals of permitted use
            -- end_ts / duration_seconds are NULL while the session is open
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_ts TEXT NOT NULL,
                end_ts TEXT,
                duration_seconds INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_ts);
            CREATE INDEX IF NOT EXISTS idx_sessions_end ON sessions(end_ts);

            -- App usage: foreground time per app, owned by a session
            CREATE TABLE IF NOT EXISTS app_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                app_name TEXT NOT NULL,
                started_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_app_usage_session_app ON app_usage(session_id, app_name);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts an open session and returns its ID.
    pub fn create_session(&mut self, start: NaiveDateTime) -> Result<SessionId, DbError> {
        self.conn.execute(
            "INSERT INTO sessions (start_ts) VALUES (?)",
            params![format_timestamp(start)],
        )?;
        Ok(SessionId::new(self.conn.last_insert_rowid()))
    }

    /// Closes a session at `end`.
    pub fn close_session(&mut self, id: SessionId, end: NaiveDateTime) -> Result<(), DbError> {
        self.close_session_at(id, &format_timestamp(end))
    }

    /// Closes a session with a raw end timestamp.
    ///
    /// The cached duration is `end - start` in whole seconds, left unclamped.
    /// If either timestamp cannot be parsed the end is still written and the
    /// duration is stored as NULL.
    pub fn close_session_at(&mut self, id: SessionId, end_ts: &str) -> Result<(), DbError> {
        let start_ts: Option<String> = self
            .conn
            .query_row(
                "SELECT start_ts FROM sessions WHERE id = ?",
                params![id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(start_ts) = start_ts else {
            return Err(DbError::SessionNotFound(id));
        };
        let duration = closed_duration(&start_ts, end_ts);
        self.conn.execute(
            "UPDATE sessions SET end_ts = ?, duration_seconds = ? WHERE id = ?",
            params![end_ts, duration, id.get()],
        )?;
        Ok(())
    }

    /// Returns the most recent session without an end time.
    pub fn open_session(&self) -> Result<Option<Session>, DbError> {
        let session = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE end_ts IS NULL
                     ORDER BY start_ts DESC, id DESC
                     LIMIT 1"
                ),
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Looks up a single session.
    pub fn session(&self, id: SessionId) -> Result<Option<Session>, DbError> {
        let session = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                params![id.get()],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Lists all sessions ordered by start then ID.
    pub fn list_sessions(&self) -> Result<Vec<Session>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_ts ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Deletes a session together with its app usage rows.
    pub fn delete_session(&mut self, id: SessionId) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM app_usage WHERE session_id = ?", params![id.get()])?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?", params![id.get()])?;
        if deleted == 0 {
            return Err(DbError::SessionNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Deletes every closed session that ended before `cutoff`.
    ///
    /// The open session is never purged. Returns the number of sessions removed.
    pub fn purge_before(&mut self, cutoff: NaiveDateTime) -> Result<usize, DbError> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM sessions
                 WHERE end_ts IS NOT NULL AND replace(end_ts, ' ', 'T') < ?
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![format_timestamp(cutoff)], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };
        for id in &ids {
            self.delete_session(SessionId::new(*id))?;
        }
        tracing::info!(count = ids.len(), %cutoff, "purged sessions");
        Ok(ids.len())
    }

    /// Sessions intersecting `day`, newest start first.
    ///
    /// The SQL range is only a pre-filter; the final decision comes from
    /// [`tl_core::session_touches_day`]. Space-separated rows are compared as
    /// if they used the `T` separator.
    pub fn sessions_overlapping(
        &self,
        day: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Session>, DbError> {
        let (day_start, day_end) = day_window(day);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE replace(start_ts, ' ', 'T') < ?1
               AND (replace(COALESCE(end_ts, ?2), ' ', 'T') >= ?3
                    OR replace(start_ts, ' ', 'T') >= ?3)
             ORDER BY replace(start_ts, ' ', 'T') DESC, id DESC"
        ))?;
        let rows = stmt.query_map(
            params![
                format_timestamp(day_end),
                format_timestamp(now),
                format_timestamp(day_start)
            ],
            session_from_row,
        )?;
        let mut sessions = Vec::new();
        for row in rows {
            let session = row?;
            if session_touches_day(&session, day, now) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// The session log of `day`.
    pub fn sessions_for_date(
        &self,
        day: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Session>, DbError> {
        self.sessions_overlapping(day, now)
    }

    /// Adds `interval_seconds` to the latest record for `(session, app_name)`.
    ///
    /// The latest matching record is used regardless of which app was sampled
    /// in between, so alternating apps fold into one record per app.
    pub fn record_app_usage(
        &mut self,
        session: SessionId,
        app_name: &str,
        interval_seconds: i64,
        now: NaiveDateTime,
    ) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM app_usage
                 WHERE session_id = ? AND app_name = ?
                 ORDER BY id DESC
                 LIMIT 1",
                params![session.get(), app_name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE app_usage SET duration_seconds = duration_seconds + ? WHERE id = ?",
                    params![interval_seconds, id],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO app_usage (session_id, app_name, started_at, duration_seconds)
                     VALUES (?, ?, ?, ?)",
                    params![session.get(), app_name, format_timestamp(now), interval_seconds],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// App usage records of one session, in creation order.
    pub fn app_usage_for_session(&self, session: SessionId) -> Result<Vec<AppUsageRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APP_USAGE_COLUMNS} FROM app_usage WHERE session_id = ? ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![session.get()], app_usage_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Per-app totals for `day`, largest first.
    pub fn app_usage_overlapping(&self, day: NaiveDate) -> Result<Vec<AppUsageTotal>, DbError> {
        let (_, day_end) = day_window(day);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APP_USAGE_COLUMNS} FROM app_usage
             WHERE replace(started_at, ' ', 'T') < ? ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![format_timestamp(day_end)], app_usage_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(app_usage_totals(&records, day))
    }

    /// Inserts or replaces a setting.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Stores the SHA-256 digest of `plain` as the enforcement PIN.
    pub fn set_pin(&mut self, plain: &str) -> Result<(), DbError> {
        if plain.is_empty() {
            return Err(DbError::EmptyPin);
        }
        self.set_setting(PIN_SETTING_KEY, &hash_pin(plain))
    }

    /// Checks `plain` against the stored PIN. Always `false` when none is set.
    pub fn verify_pin(&self, plain: &str) -> Result<bool, DbError> {
        let stored = self.get_setting(PIN_SETTING_KEY)?;
        Ok(pin_matches(stored.as_deref(), plain))
    }

    pub fn pin_configured(&self) -> Result<bool, DbError> {
        Ok(self
            .get_setting(PIN_SETTING_KEY)?
            .is_some_and(|digest| !digest.is_empty()))
    }
}

impl Ledger for Database {
    type Error = DbError;

    fn create_session(&mut self, start: NaiveDateTime) -> Result<SessionId, DbError> {
        Self::create_session(self, start)
    }

    fn close_session(&mut self, id: SessionId, end: NaiveDateTime) -> Result<(), DbError> {
        Self::close_session(self, id, end)
    }

    fn open_session(&self) -> Result<Option<Session>, DbError> {
        Self::open_session(self)
    }

    fn sessions_overlapping(
        &self,
        day: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<Session>, DbError> {
        Self::sessions_overlapping(self, day, now)
    }

    fn record_app_usage(
        &mut self,
        session: SessionId,
        app_name: &str,
        interval_seconds: i64,
        now: NaiveDateTime,
    ) -> Result<(), DbError> {
        Self::record_app_usage(self, session, app_name, interval_seconds, now)
    }

    fn pin_configured(&self) -> Result<bool, DbError> {
        Self::pin_configured(self)
    }

    fn set_pin(&mut self, plain: &str) -> Result<(), DbError> {
        Self::set_pin(self, plain)
    }

    fn verify_pin(&self, plain: &str) -> Result<bool, DbError> {
        Self::verify_pin(self, plain)
    }
}
