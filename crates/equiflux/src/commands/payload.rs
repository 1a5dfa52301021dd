use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Table;
use equiflux_core::memory::{InMemoryChannelRepository, StaticHierarchy};
use equiflux_core::{
    map_rows, validate_wkeid, ChannelDefinition, ChannelDefinitionCatalog, ChannelMapper,
    InMemoryTtlCache, ServiceConfig, WriteRow,
};
use equiflux_parser::{parse_bulk_payload_str, parse_payload_str};
use tracing::info;

use super::connect;
use super::seed::{load_catalog, SeedFile};

#[derive(Args, Debug)]
pub struct ValidatePayloadArgs {
    /// JSON payload file
    pub file: PathBuf,
    /// Treat the file as a bulk payload with an `equipments` array
    #[arg(long)]
    pub bulk: bool,
    /// Validate against a TOML seed file instead of the database catalog
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

/// What a write of one row group would store.
#[derive(Debug)]
pub struct GroupReport {
    pub equipment_id: Option<String>,
    pub rows: usize,
    pub fields: BTreeSet<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl GroupReport {
    fn new(equipment_id: Option<String>, rows: &[WriteRow]) -> Self {
        let fields = rows
            .iter()
            .flat_map(|row| row.fields.keys().cloned())
            .collect();
        Self {
            equipment_id,
            rows: rows.len(),
            fields,
            first: rows.iter().map(|row| row.timestamp).min().map(|ts| ts.to_rfc3339()),
            last: rows.iter().map(|row| row.timestamp).max().map(|ts| ts.to_rfc3339()),
        }
    }
}

pub async fn validate_payload(
    content: &str,
    bulk: bool,
    catalog: ChannelDefinitionCatalog,
) -> Result<Vec<GroupReport>> {
    let mapper = ChannelMapper::new(catalog);

    if !bulk {
        let payload = parse_payload_str(content).context("payload is not well formed")?;
        let rows = mapper.map_payload(&payload).await?;
        return Ok(vec![GroupReport::new(None, &rows)]);
    }

    let payload = parse_bulk_payload_str(content).context("bulk payload is not well formed")?;
    let channels = mapper.resolve_channels(&payload.channels).await?;

    let mut reports = Vec::with_capacity(payload.equipments.len());
    for group in &payload.equipments {
        let wkeid = group.equipment_id.as_deref().unwrap_or_default();
        validate_wkeid(wkeid)?;
        let rows = map_rows(&channels, group)
            .with_context(|| format!("equipment '{wkeid}' has invalid rows"))?;
        reports.push(GroupReport::new(Some(wkeid.to_string()), &rows));
    }
    Ok(reports)
}

async fn catalog_for(args: &ValidatePayloadArgs) -> Result<ChannelDefinitionCatalog> {
    if let Some(path) = &args.catalog {
        let seed = SeedFile::read(path)?;
        let (catalog, _) = load_catalog(&seed, Arc::new(InMemoryChannelRepository::new())).await?;
        return Ok(catalog);
    }

    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    let repo = connect(&config).await?;
    Ok(ChannelDefinitionCatalog::new(
        Arc::new(repo.channels()),
        Arc::new(StaticHierarchy::new()),
        Arc::new(InMemoryTtlCache::<ChannelDefinition>::with_ttl_hours(
            config.cache_ttl_hours,
        )),
    ))
}

pub async fn handle_validate_payload(args: ValidatePayloadArgs) -> Result<()> {
    let content = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read payload {}", args.file.display()))?;
    let catalog = catalog_for(&args).await?;

    let reports = validate_payload(&content, args.bulk, catalog).await?;

    let mut table = Table::new();
    table.set_header(vec!["Equipment", "Rows", "Fields", "First", "Last"]);
    for report in &reports {
        table.add_row(vec![
            report.equipment_id.clone().unwrap_or_else(|| "-".to_string()),
            report.rows.to_string(),
            report.fields.iter().cloned().collect::<Vec<_>>().join(", "),
            report.first.clone().unwrap_or_default(),
            report.last.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    info!(groups = reports.len(), file = %args.file.display(), "payload is valid");
    Ok(())
}
