pub mod payload;
pub mod query;
pub mod seed;

use anyhow::{Context, Result};
use equiflux_core::ServiceConfig;
use equiflux_repository::PostgresRepository;
use tracing::info;

pub async fn connect(config: &ServiceConfig) -> Result<PostgresRepository> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL (or EQUIFLUX_DATABASE_URL) must be set")?;

    let repo = PostgresRepository::connect(database_url, config.max_connections)
        .await
        .context("failed to connect to the channel metadata database")?;
    info!(max_connections = config.max_connections, "connected to metadata database");
    Ok(repo)
}
