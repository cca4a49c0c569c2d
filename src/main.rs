use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use tickvault::cli::args::{Cli, Commands};
use tickvault::cli::commands;
use tickvault::config::{ColorSetting, Config, Paths};
use tickvault::error::TickvaultError;
use tickvault::storage::LocalStore;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        let code = e
            .downcast_ref::<TickvaultError>()
            .map_or(1, TickvaultError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new()?;
    let config = Config::load_from_path(&paths.config_file)?;

    init_logging(&config);
    match config.general.color {
        ColorSetting::Always => colored::control::set_override(true),
        ColorSetting::Never => colored::control::set_override(false),
        ColorSetting::Auto => {},
    }
    let format = cli.output.unwrap_or(config.general.default_output);

    let output = match cli.command {
        Commands::Config { path, init } => {
            commands::config(&config, &paths, path, init, format)?
        },
        Commands::Start { entity, countdown } => {
            let store = Arc::new(open_store(&paths)?);
            commands::start(store, &config, &entity, countdown.as_deref(), format)?
        },
        Commands::Stop { entity } => commands::stop(&open_store(&paths)?, &entity, format)?,
        Commands::Status { entity } => {
            commands::status(&open_store(&paths)?, entity.as_deref(), format)?
        },
        Commands::Outbox { replay } => commands::outbox(&open_store(&paths)?, replay, format)?,
    };

    if !output.is_empty() {
        println!("{output}");
    }

    Ok(())
}

fn open_store(paths: &Paths) -> Result<LocalStore> {
    LocalStore::open(paths)
        .with_context(|| format!("opening store at {}", paths.database.display()))
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
