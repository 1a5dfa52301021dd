use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Table;
use equiflux_core::interfaces::ChannelRepository;
use equiflux_core::memory::StaticHierarchy;
use equiflux_core::{
    CacheMode, ChannelDefinition, ChannelDefinitionCatalog, NoopCache, ServiceConfig,
};
use serde::Deserialize;
use tracing::info;

use super::connect;

#[derive(Args, Debug)]
pub struct SeedCatalogArgs {
    /// TOML file with `[[node]]` and `[[channel]]` tables
    #[arg(long)]
    pub file: PathBuf,
    /// Skip running embedded database migrations before seeding
    #[arg(long)]
    pub skip_migrations: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeSeed>,
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelSeed>,
}

/// Hierarchy node that channel equipment codes are validated against.
#[derive(Debug, Deserialize)]
pub struct NodeSeed {
    pub wk_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelSeed {
    pub code: String,
    pub dimension: String,
    pub unit: String,
    pub display_name: Option<String>,
    pub legal_classification: Option<String>,
    #[serde(default)]
    pub equipment_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedAction {
    Created,
    Updated,
}

impl SeedAction {
    fn as_str(&self) -> &'static str {
        match self {
            SeedAction::Created => "created",
            SeedAction::Updated => "updated",
        }
    }
}

#[derive(Debug)]
pub struct SeedOutcome {
    pub definition: ChannelDefinition,
    pub action: SeedAction,
}

impl SeedFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse catalog seed file")
    }

    pub fn read(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn hierarchy(&self) -> StaticHierarchy {
        self.nodes
            .iter()
            .fold(StaticHierarchy::new(), |hierarchy, node| {
                hierarchy.with_node(&node.wk_id, &node.name)
            })
    }

    fn definitions(&self) -> impl Iterator<Item = ChannelDefinition> + '_ {
        self.channels.iter().map(|seed| ChannelDefinition {
            id: None,
            code: seed.code.clone(),
            dimension: seed.dimension.clone(),
            unit: seed.unit.clone(),
            display_name: seed.display_name.clone(),
            legal_classification: seed.legal_classification.clone(),
            equipment_codes: seed.equipment_codes.clone(),
        })
    }
}

/// Creates missing definitions and replaces existing ones, in file order.
pub async fn load_catalog(
    seed: &SeedFile,
    repository: Arc<dyn ChannelRepository>,
) -> Result<(ChannelDefinitionCatalog, Vec<SeedOutcome>)> {
    let catalog = ChannelDefinitionCatalog::new(
        repository,
        Arc::new(seed.hierarchy()),
        Arc::new(NoopCache::<ChannelDefinition>::new()),
    );

    let mut outcomes = Vec::with_capacity(seed.channels.len());
    for definition in seed.definitions() {
        let code = definition.code.clone();
        let existing = catalog.get_by_code(&code, CacheMode::Bypass).await?;
        let (definition, action) = match existing {
            Some(_) => (catalog.update(definition).await, SeedAction::Updated),
            None => (catalog.create(definition).await, SeedAction::Created),
        };
        let definition = definition.with_context(|| format!("failed to seed channel '{code}'"))?;
        outcomes.push(SeedOutcome { definition, action });
    }
    Ok((catalog, outcomes))
}

pub async fn handle_seed_catalog(args: SeedCatalogArgs) -> Result<()> {
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    let seed = SeedFile::read(&args.file)?;

    let repo = connect(&config).await?;
    if args.skip_migrations {
        info!("Skipping migrations at user request");
    } else {
        repo.run_migrations().await?;
    }

    let (catalog, outcomes) = load_catalog(&seed, Arc::new(repo.channels())).await?;

    let mut table = Table::new();
    table.set_header(vec!["Code", "Field", "Dimension", "Equipment", "Action"]);
    for outcome in &outcomes {
        let definition = &outcome.definition;
        table.add_row(vec![
            definition.code.clone(),
            catalog.field_name(&definition.code).await?,
            definition.dimension.clone(),
            definition.equipment_codes.join(", "),
            outcome.action.as_str().to_string(),
        ]);
    }
    println!("{table}");
    info!(channels = outcomes.len(), "catalog seeded");
    Ok(())
}
