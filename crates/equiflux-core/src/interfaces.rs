//! Contracts for the collaborators the engine talks to: metadata
//! repositories, the equipment hierarchy, and the time-series historian.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::equipment::Equipment;
use crate::query::Query;
use crate::types::{
    ChannelDefinition, InfluxPath, MappingCandidate, ProvisionOutcome, StorageMapping, WriteRow,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),

    #[error("record is missing an id: {0}")]
    MissingId(String),
}

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("hierarchy code '{0}' not found")]
    NotFound(String),

    #[error("hierarchy transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum HistorianError {
    #[error("historian transport failure: {0}")]
    Transport(String),

    #[error("historian returned an unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Code(String),
    Codes(Vec<String>),
    EquipmentCode(String),
    All,
}

impl ChannelFilter {
    pub fn matches(&self, definition: &ChannelDefinition) -> bool {
        match self {
            ChannelFilter::Code(code) => definition.code == *code,
            ChannelFilter::Codes(codes) => codes.iter().any(|code| definition.code == *code),
            ChannelFilter::EquipmentCode(equipment_code) => definition
                .equipment_codes
                .iter()
                .any(|code| code == equipment_code),
            ChannelFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingFilter {
    EquipmentCode(String),
    Measurement {
        database_name: String,
        measurement_name: String,
    },
    All,
}

impl MappingFilter {
    pub fn matches(&self, mapping: &StorageMapping) -> bool {
        match self {
            MappingFilter::EquipmentCode(code) => mapping.covers(code),
            MappingFilter::Measurement {
                database_name,
                measurement_name,
            } => {
                mapping.database_name == *database_name
                    && mapping.measurement_name == *measurement_name
            }
            MappingFilter::All => true,
        }
    }
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get(&self, filter: &ChannelFilter)
        -> Result<Option<ChannelDefinition>, RepositoryError>;

    async fn query_many(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Vec<ChannelDefinition>, RepositoryError>;

    /// Inserts or replaces by id. The definition must carry an id.
    async fn upsert(&self, definition: &ChannelDefinition)
        -> Result<ChannelDefinition, RepositoryError>;

    async fn delete_many(&self, filter: &ChannelFilter) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn get(&self, filter: &MappingFilter) -> Result<Option<StorageMapping>, RepositoryError>;

    async fn query_many(&self, filter: &MappingFilter)
        -> Result<Vec<StorageMapping>, RepositoryError>;

    async fn upsert(&self, mapping: &StorageMapping) -> Result<StorageMapping, RepositoryError>;

    /// Idempotent provisioning keyed by `(database, measurement)`. A new pair is
    /// created disabled; an existing pair gains the candidate's equipment code
    /// and keeps its status. Must be atomic with respect to concurrent callers.
    async fn provision(&self, candidate: &MappingCandidate)
        -> Result<ProvisionOutcome, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub wk_id: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<String>,
}

#[async_trait]
pub trait HierarchyClient: Send + Sync {
    /// Fails with [`HierarchyError::NotFound`] for unknown codes.
    async fn resolve(&self, wk_id: &str) -> Result<HierarchyNode, HierarchyError>;
}

#[async_trait]
pub trait EquipmentDirectory: Send + Sync {
    async fn equipment(&self, wkeid: &str) -> Result<Option<Equipment>, HierarchyError>;
}

/// One row of a flat historian response, keyed by column name.
pub type HistorianRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[async_trait]
pub trait HistorianClient: Send + Sync {
    async fn execute_query(&self, query: &Query) -> Result<Vec<HistorianRow>, HistorianError>;

    async fn execute_multi_series(&self, query: &Query) -> Result<Vec<Series>, HistorianError>;

    async fn latest_timestamp(&self, query: &Query)
        -> Result<Option<DateTime<Utc>>, HistorianError>;
}

#[async_trait]
pub trait HistorianWriter: Send + Sync {
    async fn write_rows(
        &self,
        path: &InfluxPath,
        equipment_instance: &str,
        rows: &[WriteRow],
    ) -> Result<(), HistorianError>;
}
