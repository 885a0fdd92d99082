use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tl_cli::commands::{purge, run, set_pin, status, util};
use tl_cli::terminal::LinePrompt;
use tl_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tl_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tl_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Run) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            run::run(&config, db)?;
        }
        Some(Commands::Status { date, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let now = util::now();
            let day = util::parse_day(date, now.date())?;
            status::run(&mut std::io::stdout(), &db, day, now, *json)?;
        }
        Some(Commands::SetPin) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let mut prompt = LinePrompt::new(std::io::stdin().lock());
            set_pin::run(&mut std::io::stdout(), &mut db, &mut prompt)?;
        }
        Some(Commands::Purge { before }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let before = util::parse_day(before, util::now().date())?;
            let mut prompt = LinePrompt::new(std::io::stdin().lock());
            purge::run(&mut std::io::stdout(), &mut db, &mut prompt, before)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
