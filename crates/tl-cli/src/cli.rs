//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Daily computer-usage limiter.
///
/// Records sessions of permitted use, totals them per calendar day, and holds
/// the machine on a lock screen between sessions.
#[derive(Debug, Parser)]
#[command(name = "tl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the limiter in the foreground.
    ///
    /// Reads operator commands from stdin: `stop`, `unlock`, `status` and
    /// `quit [PIN]`.
    Run,

    /// Show usage for a day.
    Status {
        /// Day to report: YYYY-MM-DD, "today", "yesterday" or "N days ago".
        #[arg(long, default_value = "today")]
        date: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Set or replace the shutdown PIN.
    ///
    /// Reads the current PIN (when one is set), the new PIN and its
    /// confirmation from stdin, one per line.
    SetPin,

    /// Delete closed sessions that ended before a day.
    ///
    /// Reads the PIN from stdin when one is set.
    Purge {
        /// First day to keep: YYYY-MM-DD, "today", "yesterday" or "N days ago".
        #[arg(long)]
        before: String,
    },
}
