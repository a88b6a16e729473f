//! scanpest - Command-line interface for ScanPest

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::annotate::run_annotate;
use crate::commands::common::CommandContext;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::list::{run_list, run_show, run_stats};
use crate::commands::note::run_note;
use crate::commands::record::run_record;
use crate::commands::sync::run_sync;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "scanpest_core=info,scanpest_cli=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CommandContext::resolve(cli.db_path, cli.profile.as_deref(), cli.user)?;

    match cli.command {
        Commands::Record {
            image,
            boxes,
            captured_at,
        } => run_record(&image, &boxes, captured_at, &context).await,
        Commands::List {
            pest,
            ascending,
            limit,
            json,
        } => run_list(pest.as_deref(), ascending, limit, json, &context).await,
        Commands::Show { id, json } => run_show(&id, json, &context).await,
        Commands::Stats { json } => run_stats(json, &context).await,
        Commands::Delete { id, pest, all } => {
            run_delete(id.as_deref(), pest.as_deref(), all, &context).await
        }
        Commands::Note { id, text, clear } => run_note(&id, &text, clear, &context).await,
        Commands::Sync {
            command,
            token,
            json,
        } => run_sync(command, token, json, &context).await,
        Commands::Annotate { id, output, font } => {
            run_annotate(&id, output, font.as_deref(), &context).await
        }
        Commands::Config { command } => run_config(command, cli.profile.as_deref(), &context),
    }
}
