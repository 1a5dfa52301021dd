use anyhow::{Context, Result};
use equiflux_core::ServiceConfig;
use equiflux_repository::PostgresRepository;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL (or EQUIFLUX_DATABASE_URL) must be set")?;

    let repo = PostgresRepository::connect(database_url, config.max_connections).await?;
    repo.run_migrations().await?;
    println!("Channel metadata schema is up to date.");
    Ok(())
}
