//! Satchel CLI - operator tool for the offline write queue
//!
//! Reads the same local database as the application to inspect pending
//! writes, replay them, and resolve conflicts by hand.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::cache::run_cache;
use crate::commands::common::resolve_db_path;
use crate::commands::conflicts::{run_conflicts, run_resolve};
use crate::commands::queue::{run_count, run_queue};
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "satchel=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Queue { json } => run_queue(json, &db_path).await?,
        Commands::Count => run_count(&db_path).await?,
        Commands::Sync => run_sync(&db_path).await?,
        Commands::Conflicts { json } => run_conflicts(json, &db_path).await?,
        Commands::Resolve { key } => run_resolve(&key, &db_path).await?,
        Commands::Cache { key, json } => run_cache(&key, json, &db_path).await?,
    }

    Ok(())
}
