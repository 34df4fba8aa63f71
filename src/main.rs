#![allow(non_snake_case)]

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calendarReminder::cli::Cli;
use calendarReminder::config::{AppConfig, EngineConfig};
use calendarReminder::runtime;

const CONFIG_FILE_VAR: &str = "CALENDAR_REMINDER_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| env::var(CONFIG_FILE_VAR).ok().map(PathBuf::from));
    let file = match config_path {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?,
        None => AppConfig::default(),
    };
    let config = EngineConfig::resolve(&cli, &file)?;

    let default_filter = if config.debug {
        "calendarReminder=debug"
    } else {
        "calendarReminder=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    runtime::run(config).await
}
