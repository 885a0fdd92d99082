//! Foreground application probes.

use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tl_core::{ForegroundAppProbe, ProbeError};

/// Seconds a single probe may run before its sample is dropped.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 2;

/// A probe that can be moved onto the blocking pool.
pub type BoxedProbe = Box<dyn ForegroundAppProbe + Send>;

/// Runs a command and reads the foreground app name from its output.
///
/// The first non-blank stdout line is the app name. Empty output means
/// there is nothing in the foreground.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    /// Builds a probe from an argv. `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }
}

impl ForegroundAppProbe for CommandProbe {
    fn foreground_app(&mut self) -> Result<Option<String>, ProbeError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|err| ProbeError::new(format!("failed to run {}: {err}", self.program)))?;

        if !output.status.success() {
            return Err(ProbeError::new(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }
}

/// Runs a probe on tokio's blocking pool under a deadline.
///
/// A probe that outlives its deadline keeps the underlying probe busy. Later
/// readings fail fast until it returns, so at most one blocking thread is ever
/// stuck on a hung command.
#[derive(Clone)]
pub struct TimedProbe {
    probe: Arc<Mutex<BoxedProbe>>,
    timeout: Duration,
}

impl TimedProbe {
    pub fn new(probe: BoxedProbe, timeout: Duration) -> Self {
        Self {
            probe: Arc::new(Mutex::new(probe)),
            timeout,
        }
    }

    /// Takes one reading. Timeouts are reported as [`ProbeError`].
    pub async fn read(&self) -> Result<Option<String>, ProbeError> {
        let probe = Arc::clone(&self.probe);
        let task = tokio::task::spawn_blocking(move || {
            let Ok(mut guard) = probe.try_lock() else {
                return Err(ProbeError::new("previous probe is still running"));
            };
            guard.foreground_app()
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(err)) => Err(ProbeError::new(format!("probe task failed: {err}"))),
            Err(_) => Err(ProbeError::new(format!(
                "probe timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// A probe for platforms without foreground detection. Never reports an app.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl ForegroundAppProbe for NoProbe {
    fn foreground_app(&mut self) -> Result<Option<String>, ProbeError> {
        Ok(None)
    }
}

/// The built-in probe for this platform, if there is one.
pub fn platform_default() -> Option<CommandProbe> {
    #[cfg(target_os = "linux")]
    {
        Some(CommandProbe::new(
            "xdotool",
            &["getactivewindow", "getwindowclassname"],
        ))
    }

    #[cfg(target_os = "macos")]
    {
        Some(CommandProbe::new(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
        ))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

/// Chooses the probe for a run: the configured command, else the platform default.
pub fn from_config(probe_command: Option<&[String]>) -> BoxedProbe {
    if let Some(argv) = probe_command {
        if let Some(probe) = CommandProbe::from_argv(argv) {
            tracing::debug!(?probe, "using configured foreground probe");
            return Box::new(probe);
        }
        tracing::warn!("probe_command is empty, falling back to the platform probe");
    }
    match platform_default() {
        Some(probe) => Box::new(probe),
        None => {
            tracing::info!("no foreground probe on this platform, app usage will not be recorded");
            Box::new(NoProbe)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| (*part).to_string()).collect()
    }

    #[test]
    fn empty_argv_has_no_probe() {
        assert!(CommandProbe::from_argv(&[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn command_probe_reads_first_non_blank_line() {
        let mut probe =
            CommandProbe::from_argv(&argv(&["sh", "-c", "printf '\\n  Editor  \\nOther\\n'"]))
                .unwrap();
        assert_eq!(probe.foreground_app().unwrap().as_deref(), Some("Editor"));
    }

    #[cfg(unix)]
    #[test]
    fn command_probe_empty_output_is_none() {
        let mut probe = CommandProbe::from_argv(&argv(&["true"])).unwrap();
        assert_eq!(probe.foreground_app().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn command_probe_failure_is_an_error() {
        let mut probe = CommandProbe::from_argv(&argv(&["false"])).unwrap();
        assert!(probe.foreground_app().is_err());

        let mut missing = CommandProbe::from_argv(&argv(&["tl-no-such-probe-binary"])).unwrap();
        let err = missing.foreground_app().unwrap_err();
        assert!(err.message.contains("tl-no-such-probe-binary"));
    }

    #[test]
    fn no_probe_reports_nothing() {
        assert_eq!(NoProbe.foreground_app().unwrap(), None);
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let output = runtime.block_on(future);
        // A timed-out probe may still be sleeping on the blocking pool.
        runtime.shutdown_background();
        output
    }

    #[cfg(unix)]
    #[test]
    fn timed_probe_passes_readings_through() {
        let probe = TimedProbe::new(
            Box::new(CommandProbe::from_argv(&argv(&["echo", "Editor"])).unwrap()),
            Duration::from_secs(5),
        );
        let reading = block_on(probe.read());
        assert_eq!(reading.unwrap().as_deref(), Some("Editor"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_times_out() {
        let probe = TimedProbe::new(
            Box::new(CommandProbe::from_argv(&argv(&["sleep", "3"])).unwrap()),
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        let (first, second) = block_on(async { (probe.read().await, probe.read().await) });
        assert!(started.elapsed() < Duration::from_secs(2));

        let err = first.unwrap_err();
        assert!(err.message.contains("timed out"), "{err}");
        assert!(second.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn configured_command_wins() {
        let command = argv(&["echo", "Browser"]);
        let mut probe = from_config(Some(&command));
        assert_eq!(probe.foreground_app().unwrap().as_deref(), Some("Browser"));
    }
}
