use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use equiflux_core::memory::StaticHierarchy;
use equiflux_core::{MappingStatus, NoopCache, ServiceConfig, StorageMapping, StoragePathResolver};
use equiflux_repository::PostgresRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Equiflux storage mapping administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List storage mappings with their equipment codes and status
    ListMappings(ListMappingsArgs),
    /// Allow writes through the mapping that covers an equipment code
    EnableMapping(MappingArgs),
    /// Block writes through the mapping that covers an equipment code
    DisableMapping(MappingArgs),
}

#[derive(Args, Debug, Default)]
struct ListMappingsArgs {
    /// Only show mappings in this status (enabled or disabled)
    #[arg(long)]
    status: Option<String>,
}

#[derive(Args, Debug)]
struct MappingArgs {
    /// Equipment code (EquipmentSystem classification) covered by the mapping
    equipment_code: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let resolver = connect_resolver().await?;

    match cli.command {
        Command::ListMappings(args) => handle_list_mappings(&resolver, args).await,
        Command::EnableMapping(args) => {
            handle_set_status(&resolver, args, MappingStatus::Enabled).await
        }
        Command::DisableMapping(args) => {
            handle_set_status(&resolver, args, MappingStatus::Disabled).await
        }
    }
}

async fn connect_resolver() -> Result<StoragePathResolver> {
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL (or EQUIFLUX_DATABASE_URL) must be set")?;

    let repo = PostgresRepository::connect(database_url, config.max_connections).await?;
    repo.run_migrations().await?;

    // Mapping changes must be visible to this process immediately.
    Ok(StoragePathResolver::new(
        Arc::new(repo.mappings()),
        Arc::new(StaticHierarchy::new()),
        Arc::new(NoopCache::<StorageMapping>::new()),
        config.support_contact,
    ))
}

async fn handle_list_mappings(resolver: &StoragePathResolver, args: ListMappingsArgs) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(|value| {
            MappingStatus::parse(value)
                .with_context(|| format!("unknown mapping status '{value}'"))
        })
        .transpose()?;

    let mappings: Vec<StorageMapping> = resolver
        .list_mappings()
        .await?
        .into_iter()
        .filter(|mapping| status.map_or(true, |wanted| mapping.status == wanted))
        .collect();

    if mappings.is_empty() {
        println!("No storage mappings found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Database",
        "Measurement",
        "Equipment codes",
        "Status",
        "Brand",
        "Technology",
    ]);
    for mapping in &mappings {
        table.add_row(vec![
            mapping.database_name.clone(),
            mapping.measurement_name.clone(),
            mapping.equipment_codes.join(", "),
            mapping.status.to_string(),
            format!("{} ({})", mapping.brand_name, mapping.brand_code),
            format!("{} ({})", mapping.technology_name, mapping.technology_code),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_set_status(
    resolver: &StoragePathResolver,
    args: MappingArgs,
    status: MappingStatus,
) -> Result<()> {
    let mapping = resolver
        .set_mapping_status(&args.equipment_code, status)
        .await
        .with_context(|| format!("failed to update mapping for '{}'", args.equipment_code))?;

    info!(equipment_code = %args.equipment_code, status = %mapping.status, "mapping updated");
    println!(
        "Mapping {}/{} is now {} (equipment codes: {}).",
        mapping.database_name,
        mapping.measurement_name,
        mapping.status,
        mapping.equipment_codes.join(", ")
    );
    Ok(())
}
