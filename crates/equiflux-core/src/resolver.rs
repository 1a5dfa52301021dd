// crates/equiflux-core/src/resolver.rs

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::equipment::Equipment;
use crate::error::{Result, ServiceError};
use crate::interfaces::{HierarchyClient, MappingFilter, MappingRepository};
use crate::types::{InfluxPath, MappingCandidate, MappingStatus, Operation, StorageMapping};

/// Routes an equipment to its database/measurement, provisioning a disabled
/// mapping the first time an unmapped equipment code is written.
#[derive(Clone)]
pub struct StoragePathResolver {
    mappings: Arc<dyn MappingRepository>,
    hierarchy: Arc<dyn HierarchyClient>,
    cache: Arc<dyn TtlCache<StorageMapping>>,
    support_contact: String,
}

impl StoragePathResolver {
    pub fn new(
        mappings: Arc<dyn MappingRepository>,
        hierarchy: Arc<dyn HierarchyClient>,
        cache: Arc<dyn TtlCache<StorageMapping>>,
        support_contact: impl Into<String>,
    ) -> Self {
        Self {
            mappings,
            hierarchy,
            cache,
            support_contact: support_contact.into(),
        }
    }

    /// `Ok(None)` means the equipment has no storage path; reads treat that as
    /// "no data".
    pub async fn resolve_read(&self, equipment: &Equipment) -> Result<Option<InfluxPath>> {
        self.resolve(equipment, Operation::Read).await
    }

    /// Fails instead of returning `None`, and never routes to a disabled
    /// mapping.
    pub async fn resolve_write(&self, equipment: &Equipment) -> Result<InfluxPath> {
        self.resolve(equipment, Operation::Write)
            .await?
            .ok_or_else(|| ServiceError::NoStoragePath {
                wkeid: equipment.wkeid.clone(),
            })
    }

    pub async fn resolve(
        &self,
        equipment: &Equipment,
        operation: Operation,
    ) -> Result<Option<InfluxPath>> {
        let Some(equipment_code) = equipment.equipment_code() else {
            debug!(wkeid = %equipment.wkeid, "equipment has no equipment system classification");
            return Ok(None);
        };

        if let Some(mapping) = self.lookup(equipment_code, operation).await? {
            if operation == Operation::Write {
                self.ensure_enabled(&mapping, equipment, equipment_code)?;
            }
            return Ok(Some(mapping.path_for(equipment_code)));
        }

        let Some(candidate) = self.candidate(equipment, equipment_code).await? else {
            debug!(
                wkeid = %equipment.wkeid,
                equipment_code = %equipment_code,
                "equipment lacks brand or technology classification"
            );
            return Ok(None);
        };

        if operation == Operation::Read {
            return Ok(Some(candidate.path()));
        }

        let outcome = self.mappings.provision(&candidate).await.map_err(|err| {
            error!(
                equipment_code = %equipment_code,
                error = %err,
                "storage mapping provisioning failed"
            );
            ServiceError::ProvisioningFailed {
                equipment_code: equipment_code.to_string(),
                reason: err.to_string(),
            }
        })?;
        self.cache.invalidate(equipment_code).await;

        if outcome.measurement_created {
            info!(
                equipment_code = %equipment_code,
                database = %candidate.database_name,
                measurement = %candidate.measurement_name,
                "storage mapping provisioned in disabled state"
            );
        } else {
            info!(
                equipment_code = %equipment_code,
                database = %candidate.database_name,
                measurement = %candidate.measurement_name,
                "equipment code joined existing storage mapping"
            );
        }

        self.ensure_enabled(&outcome.mapping, equipment, equipment_code)?;
        Ok(Some(outcome.mapping.path_for(equipment_code)))
    }

    /// Administrative enable/disable of the mapping covering `equipment_code`.
    pub async fn set_mapping_status(
        &self,
        equipment_code: &str,
        status: MappingStatus,
    ) -> Result<StorageMapping> {
        let mut mapping = self
            .mappings
            .get(&MappingFilter::EquipmentCode(equipment_code.to_string()))
            .await?
            .ok_or_else(|| ServiceError::MappingNotFound {
                equipment_code: equipment_code.to_string(),
            })?;

        mapping.status = status;
        let stored = self.mappings.upsert(&mapping).await?;
        for code in &stored.equipment_codes {
            self.cache.invalidate(code).await;
        }

        info!(
            equipment_code = %equipment_code,
            database = %stored.database_name,
            measurement = %stored.measurement_name,
            status = %stored.status,
            "storage mapping status changed"
        );
        Ok(stored)
    }

    pub async fn list_mappings(&self) -> Result<Vec<StorageMapping>> {
        Ok(self.mappings.query_many(&MappingFilter::All).await?)
    }

    async fn lookup(
        &self,
        equipment_code: &str,
        operation: Operation,
    ) -> Result<Option<StorageMapping>> {
        // Writes always consult the repository.
        if operation == Operation::Read {
            if let Some(hit) = self.cache.get(equipment_code).await {
                debug!(equipment_code = %equipment_code, "mapping cache hit");
                return Ok(Some(hit));
            }
            debug!(equipment_code = %equipment_code, "mapping cache miss");
        }

        let found = self
            .mappings
            .get(&MappingFilter::EquipmentCode(equipment_code.to_string()))
            .await?;

        if let Some(mapping) = &found {
            self.cache.set(equipment_code, mapping.clone()).await;
        }
        Ok(found)
    }

    async fn candidate(
        &self,
        equipment: &Equipment,
        equipment_code: &str,
    ) -> Result<Option<MappingCandidate>> {
        let (Some(brand_code), Some(technology_code)) =
            (equipment.brand_code(), equipment.technology_code())
        else {
            return Ok(None);
        };

        let brand = self.hierarchy.resolve(brand_code).await?;
        let technology = self.hierarchy.resolve(technology_code).await?;

        Ok(Some(MappingCandidate {
            database_name: storage_name(&technology.name),
            measurement_name: storage_name(&brand.name),
            equipment_code: equipment_code.to_string(),
            brand_code: brand_code.to_string(),
            technology_code: technology_code.to_string(),
            brand_name: brand.name,
            technology_name: technology.name,
        }))
    }

    fn ensure_enabled(
        &self,
        mapping: &StorageMapping,
        equipment: &Equipment,
        equipment_code: &str,
    ) -> Result<()> {
        if mapping.is_enabled() {
            return Ok(());
        }
        warn!(
            wkeid = %equipment.wkeid,
            equipment_code = %equipment_code,
            database = %mapping.database_name,
            measurement = %mapping.measurement_name,
            "write rejected: storage mapping is inactive"
        );
        Err(ServiceError::InactiveMapping {
            wkeid: equipment.wkeid.clone(),
            equipment_code: equipment_code.to_string(),
            support_contact: self.support_contact.clone(),
        })
    }
}

/// Upper-cases a hierarchy name and collapses whitespace runs to `_`.
pub fn storage_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}
