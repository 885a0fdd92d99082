//! Time limiter CLI library.
//!
//! This crate provides the `tl` binary: the scheduling loop, platform probes,
//! the terminal lock screen and the administrative subcommands.

mod cli;
pub mod commands;
mod config;
pub mod probe;
pub mod terminal;

pub use cli::{Cli, Commands};
pub use config::Config;
