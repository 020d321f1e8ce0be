//! Berth CLI - provision and operate containerised application instances

use anyhow::Result;
use berth_core::Settings;
use berth_engine::Engine;
use clap::Parser;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "berth={l},berth_engine={l},berth_backup={l},berth_runtime={l},berth_ci={l},berth_web={l}",
                    l = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    debug!(
        "Using database {} and instances root {}",
        settings.paths.database.display(),
        settings.paths.instances_root.display()
    );
    let engine = Arc::new(Engine::new(settings).await?);

    match cli.command {
        Commands::Instance { command } => instance::execute(&engine, command).await,
        Commands::Tier { command } => tier::execute(&engine, command).await,
        Commands::Backup { command } => backup::execute(&engine, command).await,
        Commands::Module { command } => module::execute(&engine, command).await,
        Commands::Serve { bind } => serve::execute(engine, bind).await,
    }
}
