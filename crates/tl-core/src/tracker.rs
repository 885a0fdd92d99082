//! Foreground application sampling.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::ledger::Ledger;
use crate::types::SessionId;

/// Default seconds between foreground samples.
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;

/// The foreground probe could not produce a reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("foreground probe failed: {message}")]
pub struct ProbeError {
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Reports the name of the application currently in the foreground.
///
/// `Ok(None)` means the platform had nothing to report this time.
pub trait ForegroundAppProbe {
    fn foreground_app(&mut self) -> Result<Option<String>, ProbeError>;
}

impl<F> ForegroundAppProbe for F
where
    F: FnMut() -> Result<Option<String>, ProbeError>,
{
    fn foreground_app(&mut self) -> Result<Option<String>, ProbeError> {
        self()
    }
}

/// Accumulates foreground time into the ledger while a session runs.
#[derive(Debug, Clone)]
pub struct AppUsageTracker {
    interval_seconds: i64,
    excluded: HashSet<String>,
    sampling: bool,
}

impl AppUsageTracker {
    /// `excluded` names are matched case-insensitively.
    pub fn new<I, S>(interval_seconds: u64, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            interval_seconds: i64::try_from(interval_seconds).unwrap_or(i64::MAX),
            excluded: excluded
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .collect(),
            sampling: false,
        }
    }

    pub const fn interval_seconds(&self) -> i64 {
        self.interval_seconds
    }

    pub const fn is_sampling(&self) -> bool {
        self.sampling
    }

    pub fn start(&mut self) {
        if !self.sampling {
            tracing::debug!("app sampling started");
        }
        self.sampling = true;
    }

    pub fn stop(&mut self) {
        if self.sampling {
            tracing::debug!("app sampling stopped");
        }
        self.sampling = false;
    }

    /// Turns a raw probe reading into the name to record, if any.
    pub fn accept(&self, reading: Result<Option<String>, ProbeError>) -> Option<String> {
        let name = match reading {
            Ok(name) => name?,
            Err(err) => {
                tracing::debug!(%err, "no foreground sample this tick");
                return None;
            }
        };
        let name = name.trim();
        if name.is_empty() || self.excluded.contains(&name.to_lowercase()) {
            return None;
        }
        Some(name.to_string())
    }

    /// Takes one sample and records it against `session`.
    ///
    /// Does nothing while not sampling or without a session. Probe failures are
    /// swallowed; storage failures are returned. Returns the recorded name.
    pub fn sample<L, P>(
        &self,
        ledger: &mut L,
        probe: &mut P,
        session: Option<SessionId>,
        now: NaiveDateTime,
    ) -> Result<Option<String>, L::Error>
    where
        L: Ledger,
        P: ForegroundAppProbe + ?Sized,
    {
        if session.is_none() || !self.sampling {
            return Ok(None);
        }
        self.record(ledger, probe.foreground_app(), session, now)
    }

    /// Records a reading taken elsewhere, e.g. off the scheduling thread.
    ///
    /// Same rules as [`Self::sample`].
    pub fn record<L: Ledger>(
        &self,
        ledger: &mut L,
        reading: Result<Option<String>, ProbeError>,
        session: Option<SessionId>,
        now: NaiveDateTime,
    ) -> Result<Option<String>, L::Error> {
        let Some(session) = session.filter(|_| self.sampling) else {
            return Ok(None);
        };
        let Some(name) = self.accept(reading) else {
            return Ok(None);
        };
        ledger.record_app_usage(session, &name, self.interval_seconds, now)?;
        tracing::debug!(%session, app = %name, "recorded foreground sample");
        Ok(Some(name))
    }
}

impl Default for AppUsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL_SECS, std::iter::empty::<&str>())
    }
}
