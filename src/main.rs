use std::fs::OpenOptions;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use certbatch::cli::{self, Cli};
use certbatch::panic_handler;
use certbatch::paths;
use certbatch::settings::Settings;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = paths::resolve_log_path()?;
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(
        level,
        Config::default(),
        OpenOptions::new().create(true).append(true).open(&log_path)?,
    )?;
    panic_handler::initialize_panic_handler();

    info!("Starting certbatch {}", env!("CARGO_PKG_VERSION"));

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => paths::default_settings_path()?,
    };
    let settings = Settings::load_or_create(&settings_path);
    let app_paths = paths::resolve_app_paths(settings_path, settings.store_path.as_deref())?;

    if let Err(e) = cli::run(&cli, &settings, &app_paths) {
        error!("Command failed: {e:?}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    info!("Shutting down certbatch");
    Ok(())
}
