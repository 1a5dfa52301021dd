//! Postgres storage for channel definitions and storage mappings.

use async_trait::async_trait;
use equiflux_core::interfaces::{
    ChannelFilter, ChannelRepository, MappingFilter, MappingRepository, RepositoryError,
};
use equiflux_core::{
    ChannelDefinition, MappingCandidate, MappingStatus, ProvisionOutcome, StorageMapping,
};
use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const CHANNEL_COLUMNS: &str = "id, code, dimension, unit, display_name, legal_classification, \
                               equipment_codes";

const MAPPING_COLUMNS: &str = "id, database_name, measurement_name, equipment_codes, status, \
                               brand_code, technology_code, brand_name, technology_name";

/// Connection and migration failures. Query failures surface through
/// [`RepositoryError`] so the engine can classify them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),
}

fn backend(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("channel metadata migrations applied");
        Ok(())
    }

    pub fn channels(&self) -> PostgresChannelRepository {
        PostgresChannelRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn mappings(&self) -> PostgresMappingRepository {
        PostgresMappingRepository {
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PostgresChannelRepository {
    pool: PgPool,
}

fn push_channel_filter(builder: &mut sqlx::QueryBuilder<'static, Postgres>, filter: &ChannelFilter) {
    match filter {
        ChannelFilter::Code(code) => {
            builder.push(" WHERE code = ").push_bind(code.clone());
        }
        ChannelFilter::Codes(codes) => {
            builder
                .push(" WHERE code = ANY(")
                .push_bind(codes.clone())
                .push(")");
        }
        ChannelFilter::EquipmentCode(code) => {
            builder
                .push(" WHERE ")
                .push_bind(code.clone())
                .push(" = ANY(equipment_codes)");
        }
        ChannelFilter::All => {}
    }
}

fn channel_from_row(row: &PgRow) -> Result<ChannelDefinition, sqlx::Error> {
    Ok(ChannelDefinition {
        id: Some(row.try_get("id")?),
        code: row.try_get("code")?,
        dimension: row.try_get("dimension")?,
        unit: row.try_get("unit")?,
        display_name: row.try_get("display_name")?,
        legal_classification: row.try_get("legal_classification")?,
        equipment_codes: row.try_get("equipment_codes")?,
    })
}

#[async_trait]
impl ChannelRepository for PostgresChannelRepository {
    async fn get(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Option<ChannelDefinition>, RepositoryError> {
        let mut builder = sqlx::QueryBuilder::new(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channel_definitions"
        ));
        push_channel_filter(&mut builder, filter);
        builder.push(" ORDER BY code LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref()
            .map(channel_from_row)
            .transpose()
            .map_err(backend)
    }

    async fn query_many(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Vec<ChannelDefinition>, RepositoryError> {
        let mut builder = sqlx::QueryBuilder::new(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channel_definitions"
        ));
        push_channel_filter(&mut builder, filter);
        builder.push(" ORDER BY code");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(channel_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
    }

    async fn upsert(
        &self,
        definition: &ChannelDefinition,
    ) -> Result<ChannelDefinition, RepositoryError> {
        let id = definition
            .id
            .ok_or_else(|| RepositoryError::MissingId(definition.code.clone()))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO channel_definitions (
                id,
                code,
                dimension,
                unit,
                display_name,
                legal_classification,
                equipment_codes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                dimension = EXCLUDED.dimension,
                unit = EXCLUDED.unit,
                display_name = EXCLUDED.display_name,
                legal_classification = EXCLUDED.legal_classification,
                equipment_codes = EXCLUDED.equipment_codes,
                updated_at = now()
            RETURNING {CHANNEL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&definition.code)
        .bind(&definition.dimension)
        .bind(&definition.unit)
        .bind(&definition.display_name)
        .bind(&definition.legal_classification)
        .bind(&definition.equipment_codes)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        channel_from_row(&row).map_err(backend)
    }

    async fn delete_many(&self, filter: &ChannelFilter) -> Result<u64, RepositoryError> {
        let mut builder = sqlx::QueryBuilder::new("DELETE FROM channel_definitions");
        push_channel_filter(&mut builder, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PostgresMappingRepository {
    pool: PgPool,
}

fn push_mapping_filter(builder: &mut sqlx::QueryBuilder<'static, Postgres>, filter: &MappingFilter) {
    match filter {
        MappingFilter::EquipmentCode(code) => {
            builder
                .push(" WHERE ")
                .push_bind(code.clone())
                .push(" = ANY(equipment_codes)");
        }
        MappingFilter::Measurement {
            database_name,
            measurement_name,
        } => {
            builder
                .push(" WHERE database_name = ")
                .push_bind(database_name.clone())
                .push(" AND measurement_name = ")
                .push_bind(measurement_name.clone());
        }
        MappingFilter::All => {}
    }
}

fn mapping_from_row(row: &PgRow) -> Result<StorageMapping, RepositoryError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let status = MappingStatus::parse(&status)
        .ok_or_else(|| RepositoryError::InvalidRecord(format!("unknown mapping status '{status}'")))?;

    Ok(StorageMapping {
        id: row.try_get("id").map_err(backend)?,
        database_name: row.try_get("database_name").map_err(backend)?,
        measurement_name: row.try_get("measurement_name").map_err(backend)?,
        equipment_codes: row.try_get("equipment_codes").map_err(backend)?,
        status,
        brand_code: row.try_get("brand_code").map_err(backend)?,
        technology_code: row.try_get("technology_code").map_err(backend)?,
        brand_name: row.try_get("brand_name").map_err(backend)?,
        technology_name: row.try_get("technology_name").map_err(backend)?,
    })
}

#[async_trait]
impl MappingRepository for PostgresMappingRepository {
    async fn get(&self, filter: &MappingFilter) -> Result<Option<StorageMapping>, RepositoryError> {
        let mut builder =
            sqlx::QueryBuilder::new(format!("SELECT {MAPPING_COLUMNS} FROM storage_mappings"));
        push_mapping_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn query_many(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<StorageMapping>, RepositoryError> {
        let mut builder =
            sqlx::QueryBuilder::new(format!("SELECT {MAPPING_COLUMNS} FROM storage_mappings"));
        push_mapping_filter(&mut builder, filter);
        builder.push(" ORDER BY database_name, measurement_name");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(mapping_from_row).collect()
    }

    async fn upsert(&self, mapping: &StorageMapping) -> Result<StorageMapping, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO storage_mappings (
                id,
                database_name,
                measurement_name,
                equipment_codes,
                status,
                brand_code,
                technology_code,
                brand_name,
                technology_name
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                database_name = EXCLUDED.database_name,
                measurement_name = EXCLUDED.measurement_name,
                equipment_codes = EXCLUDED.equipment_codes,
                status = EXCLUDED.status,
                brand_code = EXCLUDED.brand_code,
                technology_code = EXCLUDED.technology_code,
                brand_name = EXCLUDED.brand_name,
                technology_name = EXCLUDED.technology_name,
                updated_at = now()
            RETURNING {MAPPING_COLUMNS}
            "#
        ))
        .bind(mapping.id)
        .bind(&mapping.database_name)
        .bind(&mapping.measurement_name)
        .bind(&mapping.equipment_codes)
        .bind(mapping.status.as_str())
        .bind(&mapping.brand_code)
        .bind(&mapping.technology_code)
        .bind(&mapping.brand_name)
        .bind(&mapping.technology_name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        mapping_from_row(&row)
    }

    /// A single statement: concurrent callers for the same pair converge on
    /// one row. `xmax = 0` marks a freshly inserted row.
    async fn provision(
        &self,
        candidate: &MappingCandidate,
    ) -> Result<ProvisionOutcome, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO storage_mappings (
                id,
                database_name,
                measurement_name,
                equipment_codes,
                status,
                brand_code,
                technology_code,
                brand_name,
                technology_name
            ) VALUES ($1, $2, $3, ARRAY[$4::TEXT], $5, $6, $7, $8, $9)
            ON CONFLICT (database_name, measurement_name) DO UPDATE SET
                equipment_codes = CASE
                    WHEN $4::TEXT = ANY(storage_mappings.equipment_codes)
                        THEN storage_mappings.equipment_codes
                    ELSE array_append(storage_mappings.equipment_codes, $4::TEXT)
                END,
                updated_at = now()
            RETURNING {MAPPING_COLUMNS}, (xmax = 0) AS inserted
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&candidate.database_name)
        .bind(&candidate.measurement_name)
        .bind(&candidate.equipment_code)
        .bind(MappingStatus::Disabled.as_str())
        .bind(&candidate.brand_code)
        .bind(&candidate.technology_code)
        .bind(&candidate.brand_name)
        .bind(&candidate.technology_name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let measurement_created: bool = row.try_get("inserted").map_err(backend)?;
        Ok(ProvisionOutcome {
            mapping: mapping_from_row(&row)?,
            measurement_created,
        })
    }
}
