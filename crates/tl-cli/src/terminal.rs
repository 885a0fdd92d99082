//! Terminal stand-ins for the lock screen and PIN dialogs.

use std::io::{BufRead, Write};
use std::str::FromStr;

use tl_core::{LockScreen, PinPrompt, PinPurpose};

/// Prints a banner on lock and unlock.
#[derive(Debug)]
pub struct TerminalLockScreen<W: Write> {
    writer: W,
}

impl<W: Write> TerminalLockScreen<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    fn show(&mut self, line: &str) {
        if let Err(err) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            tracing::warn!(%err, "failed to write lock screen");
        }
    }
}

impl<W: Write> LockScreen for TerminalLockScreen<W> {
    fn present(&mut self) {
        self.show("*** LOCKED: type `unlock` to start a new session ***");
    }

    fn dismiss(&mut self) {
        self.show("*** UNLOCKED ***");
    }
}

/// A prompt that answers with a PIN supplied up front, e.g. `quit 1234`.
#[derive(Debug, Clone, Default)]
pub struct PresetPin(Option<String>);

impl PresetPin {
    pub const fn new(pin: Option<String>) -> Self {
        Self(pin)
    }
}

impl PinPrompt for PresetPin {
    fn prompt_pin(&mut self, _purpose: PinPurpose) -> Option<String> {
        self.0.take()
    }
}

/// Reads one PIN per line. End of input cancels.
#[derive(Debug)]
pub struct LinePrompt<R: BufRead> {
    reader: R,
}

impl<R: BufRead> LinePrompt<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> PinPrompt for LinePrompt<R> {
    fn prompt_pin(&mut self, purpose: PinPurpose) -> Option<String> {
        let label = match purpose {
            PinPurpose::Shutdown => "PIN",
            PinPurpose::Create => "new PIN",
            PinPurpose::Confirm => "confirm PIN",
        };
        eprint!("{label}: ");
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(err) => {
                tracing::warn!(%err, "failed to read PIN");
                None
            }
        }
    }
}

/// Operator commands accepted on stdin while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Stop,
    Unlock,
    Status,
    Quit { pin: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?} (expected stop, unlock, status or quit [PIN])")]
pub struct UnknownCommand(String);

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default();
        let rest = words.next();
        if words.next().is_some() {
            return Err(UnknownCommand(s.trim().to_string()));
        }
        match (command, rest) {
            ("stop", None) => Ok(Self::Stop),
            ("unlock", None) => Ok(Self::Unlock),
            ("status", None) => Ok(Self::Status),
            ("quit", pin) => Ok(Self::Quit {
                pin: pin.map(str::to_string),
            }),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}
