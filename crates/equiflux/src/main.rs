use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use equiflux_core::ServiceConfig;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::payload::{handle_validate_payload, ValidatePayloadArgs};
use commands::query::{handle_render_query, RenderQueryArgs};
use commands::seed::{handle_seed_catalog, SeedCatalogArgs};

/// Operator tooling for the equipment channel data service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the channel metadata schema migrations
    Migrate,
    /// Load channel definitions from a TOML seed file into the catalog
    SeedCatalog(SeedCatalogArgs),
    /// Print the historian query a read request would execute
    RenderQuery(RenderQueryArgs),
    /// Parse a channel payload and map it against the catalog without writing
    ValidatePayload(ValidatePayloadArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Migrate => {
            let config = ServiceConfig::from_env().context("failed to load configuration")?;
            let repo = commands::connect(&config).await?;
            repo.run_migrations().await?;
            println!("Channel metadata schema is up to date.");
            Ok(())
        }
        Command::SeedCatalog(args) => handle_seed_catalog(args).await,
        Command::RenderQuery(args) => handle_render_query(args),
        Command::ValidatePayload(args) => handle_validate_payload(args).await,
    }
}
