//! Core logic for the time limiter.
//!
//! This crate contains:
//! - Accounting: attributing session time to calendar days
//! - Session control: start/stop, crash recovery and midnight splitting
//! - App tracking: sampling the foreground application into the ledger
//! - Enforcement: the running/locked state machine and PIN-gated exit
//!
//! Storage is reached only through the [`Ledger`] trait.

pub mod accounting;
mod budget;
mod controller;
mod enforcement;
mod ledger;
pub mod pin;
#[cfg(test)]
mod testing;
pub mod time;
mod tracker;
mod types;

pub use accounting::{
    app_usage_totals, closed_duration, session_seconds_on, session_touches_day,
    total_seconds_for_date,
};
pub use budget::BudgetPolicy;
pub use controller::{ActiveSession, Rollover, SessionController, plan_rollover};
pub use enforcement::{
    EnforcementState, Enforcer, LockScreen, PinPrompt, PinPurpose, ShutdownDecision, choose_pin,
};
pub use ledger::Ledger;
pub use pin::{PIN_SETTING_KEY, hash_pin, pin_matches};
pub use time::{Clock, ManualClock, SystemClock, TimestampError, format_timestamp, parse_timestamp};
pub use tracker::{AppUsageTracker, DEFAULT_SAMPLE_INTERVAL_SECS, ForegroundAppProbe, ProbeError};
pub use types::{AppUsageRecord, AppUsageTotal, Session, SessionId};
