//! The `tl run` scheduling loop.
//!
//! A single-threaded tokio runtime multiplexes four event sources: the
//! accounting tick, the sampling tick, operator commands on stdin and Ctrl-C.
//! Each handler runs to completion before the next event is polled, so the
//! [`Engine`] is never re-entered.

use std::fmt;
use std::io::{IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use tl_core::{
    AppUsageTracker, BudgetPolicy, EnforcementState, Enforcer, LockScreen, PinPrompt, ProbeError,
    ShutdownDecision, total_seconds_for_date,
};
use tl_db::Database;

use super::util::{self, format_hms};
use crate::Config;
use crate::probe::{self, TimedProbe};
use crate::terminal::{ConsoleCommand, LinePrompt, PresetPin, TerminalLockScreen};

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Runs `op`, and once more if it fails. Logs and returns `None` when both fail.
fn retry_once<T, E: fmt::Display>(
    action: &'static str,
    mut op: impl FnMut() -> Result<T, E>,
) -> Option<T> {
    match op() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(action, %err, "storage error, retrying");
            match op() {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::error!(action, %err, "storage error");
                    None
                }
            }
        }
    }
}

/// The enforcer wired to its ledger, lock screen and budget.
///
/// Probe readings are taken by the loop and handed in, so nothing here blocks
/// on an external command.
pub struct Engine<S: LockScreen> {
    db: Database,
    enforcer: Enforcer,
    screen: S,
    budget: Option<BudgetPolicy>,
}

impl<S: LockScreen> Engine<S> {
    /// Resumes or starts a session. Failure is fatal.
    pub fn boot(
        mut db: Database,
        config: &Config,
        screen: S,
        now: NaiveDateTime,
    ) -> Result<Self> {
        let tracker = AppUsageTracker::new(config.sample_interval_secs, &config.excluded_apps);
        let enforcer =
            Enforcer::boot(&mut db, tracker, now).context("failed to start a session")?;
        let budget = config.daily_limit_minutes.map(BudgetPolicy::from_minutes);
        Ok(Self {
            db,
            enforcer,
            screen,
            budget,
        })
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    pub const fn state(&self) -> EnforcementState {
        self.enforcer.state()
    }

    pub const fn screen(&self) -> &S {
        &self.screen
    }

    /// Rollover and accounting, then the budget check.
    pub fn on_tick(&mut self, now: NaiveDateTime) {
        let total = match self.enforcer.tick(&mut self.db, now) {
            Ok(total) => total,
            Err(err) => {
                tracing::error!(%err, "tick failed");
                return;
            }
        };
        tracing::trace!(total_seconds = total, "tick");

        if self.enforcer.state() != EnforcementState::Running {
            return;
        }
        let over_budget = self
            .budget
            .as_mut()
            .is_some_and(|budget| budget.check(total, now.date()));
        if over_budget {
            self.lock(now);
        }
    }

    /// Whether a foreground reading would be recorded right now.
    pub fn wants_sample(&self) -> bool {
        self.enforcer.state() == EnforcementState::Running
    }

    pub fn on_sample(&mut self, reading: Result<Option<String>, ProbeError>, now: NaiveDateTime) {
        if let Err(err) = self.enforcer.record_sample(&mut self.db, reading, now) {
            tracing::error!(%err, "failed to record app usage");
        }
    }

    pub fn lock(&mut self, now: NaiveDateTime) {
        retry_once("stop", || {
            self.enforcer.stop(&mut self.db, &mut self.screen, now)
        });
    }

    pub fn unlock(&mut self, now: NaiveDateTime) {
        retry_once("unlock", || {
            self.enforcer.unlock(&mut self.db, &mut self.screen, now)
        });
    }

    /// PIN-gated exit. Storage failures keep the loop running.
    pub fn shutdown<P: PinPrompt>(&mut self, prompt: &mut P, now: NaiveDateTime) -> Flow {
        match self.enforcer.request_shutdown(&mut self.db, prompt, now) {
            Ok(ShutdownDecision::Accepted) => Flow::Exit,
            Ok(ShutdownDecision::Rejected) => Flow::Continue,
            Err(err) => {
                tracing::error!(%err, "shutdown failed");
                Flow::Continue
            }
        }
    }

    /// Ctrl-C: a shutdown request with no PIN.
    pub fn on_interrupt(&mut self, now: NaiveDateTime) -> Flow {
        tracing::info!("interrupt received");
        self.shutdown(&mut PresetPin::default(), now)
    }

    /// Handles one operator line from the console.
    pub fn on_line<W: Write>(&mut self, line: &str, now: NaiveDateTime, out: &mut W) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err}")?;
                return Ok(Flow::Continue);
            }
        };
        tracing::debug!(?command, "console command");

        match command {
            ConsoleCommand::Stop => self.lock(now),
            ConsoleCommand::Unlock => self.unlock(now),
            ConsoleCommand::Status => self.write_status(now, out)?,
            ConsoleCommand::Quit { pin } => {
                let flow = self.shutdown(&mut PresetPin::new(pin), now);
                if flow == Flow::Continue {
                    writeln!(out, "shutdown rejected")?;
                }
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn write_status<W: Write>(&self, now: NaiveDateTime, out: &mut W) -> Result<()> {
        let total = total_seconds_for_date(&self.db, now.date(), now)?;
        write!(
            out,
            "{}: {} used today",
            self.enforcer.state(),
            format_hms(total)
        )?;
        if let Some(budget) = &self.budget {
            write!(out, ", {} left", format_hms(budget.remaining(total)))?;
        }
        writeln!(out)?;
        Ok(())
    }
}

fn every(secs: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Ensures a PIN, boots the engine and runs until an accepted shutdown.
pub fn run(config: &Config, mut db: Database) -> Result<()> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        let mut prompt = LinePrompt::new(stdin.lock());
        Enforcer::ensure_pin(&mut db, &mut prompt).context("failed to configure PIN")?;
    } else if !db.pin_configured()? {
        tracing::warn!("no PIN configured and stdin is not a terminal; run `tl set-pin` to set one");
    }

    let probe = TimedProbe::new(
        probe::from_config(config.probe_command.as_deref()),
        Duration::from_secs(config.probe_timeout_secs.max(1)),
    );
    let screen = TerminalLockScreen::new(std::io::stdout());
    let engine = Engine::boot(db, config, screen, util::now())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let result = runtime.block_on(run_loop(config, engine, probe));
    // Neither the stdin reader nor a hung probe can be cancelled; don't wait for them.
    runtime.shutdown_background();
    result
}

async fn run_loop<S: LockScreen>(
    config: &Config,
    mut engine: Engine<S>,
    probe: TimedProbe,
) -> Result<()> {
    let mut tick = every(config.tick_interval_secs);
    let mut sample = every(config.sample_interval_secs);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    let mut stdout = std::io::stdout();

    loop {
        let flow = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => engine.on_interrupt(util::now()),
            _ = tick.tick() => {
                engine.on_tick(util::now());
                Flow::Continue
            }
            _ = sample.tick() => {
                if engine.wants_sample() {
                    let reading = probe.read().await;
                    engine.on_sample(reading, util::now());
                }
                Flow::Continue
            }
            line = lines.next_line(), if console_open => match line {
                Ok(Some(line)) => engine
                    .on_line(&line, util::now(), &mut stdout)
                    .unwrap_or_else(|err| {
                        tracing::warn!(%err, "failed to answer console command");
                        Flow::Continue
                    }),
                Ok(None) => {
                    tracing::debug!("console closed");
                    console_open = false;
                    Flow::Continue
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to read console");
                    console_open = false;
                    Flow::Continue
                }
            },
        };
        if flow == Flow::Exit {
            break;
        }
    }

    tracing::info!("stopped");
    Ok(())
}
