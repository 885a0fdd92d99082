//! The RUNNING/LOCKED gate tying session activity to the lock screen.
//!
//! The enforcer owns the [`SessionController`] and [`AppUsageTracker`]; the
//! ledger and UI collaborators are passed in per call so the scheduler stays
//! the only place that holds them.

use std::fmt;

use chrono::NaiveDateTime;

use crate::accounting::total_seconds_for_date;
use crate::controller::{Rollover, SessionController};
use crate::ledger::Ledger;
use crate::tracker::{AppUsageTracker, ForegroundAppProbe, ProbeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementState {
    Running,
    Locked,
}

impl EnforcementState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Locked => "locked",
        }
    }
}

impl fmt::Display for EnforcementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI surface shown while locked.
pub trait LockScreen {
    fn present(&mut self);
    fn dismiss(&mut self);
}

/// Why a PIN is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPurpose {
    Shutdown,
    Create,
    Confirm,
}

/// Asks the operator for a PIN. `None` means the prompt was cancelled.
pub trait PinPrompt {
    fn prompt_pin(&mut self, purpose: PinPurpose) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDecision {
    Accepted,
    Rejected,
}

/// Prompts for a new PIN and its confirmation.
///
/// Returns the PIN only when both entries are present, non-blank and equal.
pub fn choose_pin<P: PinPrompt + ?Sized>(prompt: &mut P) -> Option<String> {
    let first = prompt.prompt_pin(PinPurpose::Create)?;
    if first.is_empty() {
        return None;
    }
    let second = prompt.prompt_pin(PinPurpose::Confirm)?;
    if first == second {
        Some(first)
    } else {
        tracing::warn!("PIN confirmation did not match");
        None
    }
}

#[derive(Debug)]
pub struct Enforcer {
    state: EnforcementState,
    controller: SessionController,
    tracker: AppUsageTracker,
}

impl Enforcer {
    /// Resumes an open session left by a previous run, or starts a new one.
    ///
    /// Failure here is fatal to the caller: there is no state in which the
    /// engine runs without a session at startup.
    pub fn boot<L: Ledger>(
        ledger: &mut L,
        mut tracker: AppUsageTracker,
        now: NaiveDateTime,
    ) -> Result<Self, L::Error> {
        let mut controller = SessionController::new(now.date());
        if !controller.resume_if_open(ledger, now)? {
            controller.start(ledger, now)?;
        }
        tracker.start();
        tracing::info!(session = ?controller.current_id(), "enforcement running");
        Ok(Self {
            state: EnforcementState::Running,
            controller,
            tracker,
        })
    }

    pub const fn state(&self) -> EnforcementState {
        self.state
    }

    pub const fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub const fn tracker(&self) -> &AppUsageTracker {
        &self.tracker
    }

    /// RUNNING -> LOCKED: ends the session and presents the lock screen.
    ///
    /// A no-op while already locked. If the session cannot be closed the
    /// state is left unchanged and the error returned.
    pub fn stop<L: Ledger, S: LockScreen + ?Sized>(
        &mut self,
        ledger: &mut L,
        screen: &mut S,
        now: NaiveDateTime,
    ) -> Result<(), L::Error> {
        if self.state == EnforcementState::Locked {
            return Ok(());
        }
        self.controller.stop(ledger, now)?;
        self.tracker.stop();
        self.state = EnforcementState::Locked;
        tracing::info!("locked");
        screen.present();
        Ok(())
    }

    /// LOCKED -> RUNNING: starts a new session and dismisses the lock screen.
    pub fn unlock<L: Ledger, S: LockScreen + ?Sized>(
        &mut self,
        ledger: &mut L,
        screen: &mut S,
        now: NaiveDateTime,
    ) -> Result<(), L::Error> {
        if self.state == EnforcementState::Running {
            return Ok(());
        }
        self.controller.start(ledger, now)?;
        self.tracker.start();
        self.state = EnforcementState::Running;
        tracing::info!("unlocked");
        screen.dismiss();
        Ok(())
    }

    /// Whether the lock screen may be closed by something other than [`Self::unlock`].
    ///
    /// Always `false` while locked.
    pub fn allow_lock_screen_close(&self) -> bool {
        let allowed = self.state == EnforcementState::Running;
        if !allowed {
            tracing::debug!("ignoring attempt to close the lock screen");
        }
        allowed
    }

    /// PIN-gated exit.
    ///
    /// Without a configured PIN the shutdown always proceeds. With one, a
    /// cancelled prompt or a wrong PIN rejects it and nothing changes. An
    /// accepted shutdown closes the current session at `now`.
    pub fn request_shutdown<L: Ledger, P: PinPrompt + ?Sized>(
        &mut self,
        ledger: &mut L,
        prompt: &mut P,
        now: NaiveDateTime,
    ) -> Result<ShutdownDecision, L::Error> {
        if ledger.pin_configured()? {
            let verified = match prompt.prompt_pin(PinPurpose::Shutdown) {
                Some(pin) => ledger.verify_pin(&pin)?,
                None => false,
            };
            if !verified {
                tracing::warn!(state = %self.state, "shutdown rejected");
                return Ok(ShutdownDecision::Rejected);
            }
        }
        self.controller.stop(ledger, now)?;
        self.tracker.stop();
        tracing::info!("shutdown accepted");
        Ok(ShutdownDecision::Accepted)
    }

    /// Initial PIN setup. Returns whether a PIN is configured afterwards.
    pub fn ensure_pin<L: Ledger, P: PinPrompt + ?Sized>(
        ledger: &mut L,
        prompt: &mut P,
    ) -> Result<bool, L::Error> {
        if ledger.pin_configured()? {
            return Ok(true);
        }
        let Some(pin) = choose_pin(prompt) else {
            tracing::warn!("PIN left unset");
            return Ok(false);
        };
        ledger.set_pin(&pin)?;
        tracing::info!("PIN configured");
        Ok(true)
    }

    /// The 1-second tick: midnight rollover, then today's total.
    ///
    /// While RUNNING without a session (an earlier split or restart failed
    /// halfway) a new session is started here.
    pub fn tick<L: Ledger>(&mut self, ledger: &mut L, now: NaiveDateTime) -> Result<i64, L::Error> {
        let rollover = self.controller.rollover_if_date_changed(ledger, now)?;
        if rollover != Rollover::Unchanged {
            tracing::debug!(?rollover, "rollover handled");
        }
        if self.state == EnforcementState::Running && !self.controller.is_running() {
            tracing::warn!("running without a session, starting one");
            self.controller.start(ledger, now)?;
        }
        total_seconds_for_date(ledger, now.date(), now)
    }

    /// The sampling tick. Records nothing while LOCKED.
    pub fn sample<L: Ledger, P: ForegroundAppProbe + ?Sized>(
        &mut self,
        ledger: &mut L,
        probe: &mut P,
        now: NaiveDateTime,
    ) -> Result<Option<String>, L::Error> {
        if self.state == EnforcementState::Locked {
            return Ok(None);
        }
        self.tracker
            .sample(ledger, probe, self.controller.current_id(), now)
    }

    /// Records a probe reading taken outside the enforcer. Ignored while locked.
    pub fn record_sample<L: Ledger>(
        &mut self,
        ledger: &mut L,
        reading: Result<Option<String>, ProbeError>,
        now: NaiveDateTime,
    ) -> Result<Option<String>, L::Error> {
        if self.state == EnforcementState::Locked {
            return Ok(None);
        }
        self.tracker
            .record(ledger, reading, self.controller.current_id(), now)
    }
}
