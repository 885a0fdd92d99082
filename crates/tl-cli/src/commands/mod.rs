//! CLI subcommand implementations.

pub mod purge;
pub mod run;
pub mod set_pin;
pub mod status;
pub mod util;
