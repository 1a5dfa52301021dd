// crates/equiflux-core/src/catalog.rs

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::error::{Result, ServiceError};
use crate::fields::{decode_field_name, strip_aggregation_prefix};
use crate::interfaces::{ChannelFilter, ChannelRepository, HierarchyClient};
use crate::types::{ChannelDefinition, ChannelDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Cached,
    /// Always read the repository.
    Bypass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub equipment_code: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Canonical channel metadata with a TTL read cache in front of the
/// repository. Every mutation evicts the codes it touched.
#[derive(Clone)]
pub struct ChannelDefinitionCatalog {
    repository: Arc<dyn ChannelRepository>,
    hierarchy: Arc<dyn HierarchyClient>,
    cache: Arc<dyn TtlCache<ChannelDefinition>>,
}

impl ChannelDefinitionCatalog {
    pub fn new(
        repository: Arc<dyn ChannelRepository>,
        hierarchy: Arc<dyn HierarchyClient>,
        cache: Arc<dyn TtlCache<ChannelDefinition>>,
    ) -> Self {
        Self {
            repository,
            hierarchy,
            cache,
        }
    }

    pub async fn create(&self, mut definition: ChannelDefinition) -> Result<ChannelDefinition> {
        if let Some(id) = definition.id {
            return Err(ServiceError::IdAlreadyAssigned {
                code: definition.code,
                id,
            });
        }
        validate_definition(&definition)?;
        self.validate_equipment_codes(&definition.equipment_codes).await?;

        if self
            .repository
            .get(&ChannelFilter::Code(definition.code.clone()))
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicateChannelCode {
                code: definition.code,
            });
        }

        definition.id = Some(Uuid::new_v4());
        let stored = self.repository.upsert(&definition).await?;
        self.cache.invalidate(&stored.code).await;
        info!(code = %stored.code, "channel definition created");
        Ok(stored)
    }

    /// Replaces an existing definition, keeping its id.
    pub async fn update(&self, mut definition: ChannelDefinition) -> Result<ChannelDefinition> {
        validate_definition(&definition)?;
        self.validate_equipment_codes(&definition.equipment_codes).await?;

        let existing = self.require(&definition.code, CacheMode::Bypass).await?;
        definition.id = existing.id;

        let stored = self.repository.upsert(&definition).await?;
        self.cache.invalidate(&stored.code).await;
        info!(code = %stored.code, "channel definition updated");
        Ok(stored)
    }

    pub async fn delete(&self, code: &str) -> Result<()> {
        let deleted = self
            .repository
            .delete_many(&ChannelFilter::Code(code.to_string()))
            .await?;
        self.cache.invalidate(code).await;

        if deleted == 0 {
            return Err(ServiceError::ChannelNotFound {
                code: code.to_string(),
            });
        }
        info!(code = %code, "channel definition deleted");
        Ok(())
    }

    pub async fn get_by_code(
        &self,
        code: &str,
        mode: CacheMode,
    ) -> Result<Option<ChannelDefinition>> {
        if mode == CacheMode::Cached {
            if let Some(hit) = self.cache.get(code).await {
                debug!(code = %code, "channel cache hit");
                return Ok(Some(hit));
            }
            debug!(code = %code, "channel cache miss");
        }

        let found = self
            .repository
            .get(&ChannelFilter::Code(code.to_string()))
            .await?;

        if mode == CacheMode::Cached {
            if let Some(definition) = &found {
                self.cache.set(code, definition.clone()).await;
            }
        }
        Ok(found)
    }

    pub async fn require(&self, code: &str, mode: CacheMode) -> Result<ChannelDefinition> {
        self.get_by_code(code, mode)
            .await?
            .ok_or_else(|| ServiceError::ChannelNotFound {
                code: code.to_string(),
            })
    }

    pub async fn field_name(&self, code: &str) -> Result<String> {
        self.require(code, CacheMode::Cached).await?.field_name()
    }

    /// Maps a storage column back to a `{code, unit}` projection. Aggregated
    /// aliases (`mean_<field>`) are unwrapped; codes the catalog does not
    /// know are returned as decoded.
    pub async fn channel_description(&self, field_name: &str) -> Result<ChannelDescription> {
        let stripped = strip_aggregation_prefix(field_name);

        for candidate in std::iter::once(field_name).chain(stripped) {
            let decoded = decode_field_name(candidate);
            if let Some(definition) = self.get_by_code(&decoded.code, CacheMode::Cached).await? {
                return Ok(ChannelDescription {
                    code: definition.code,
                    unit: definition.unit,
                });
            }
        }

        Ok(decode_field_name(stripped.unwrap_or(field_name)))
    }

    pub async fn list(&self) -> Result<Vec<ChannelDefinition>> {
        Ok(self.repository.query_many(&ChannelFilter::All).await?)
    }

    pub async fn channels_for_equipment(&self, equipment_code: &str) -> Result<Vec<ChannelDefinition>> {
        Ok(self
            .repository
            .query_many(&ChannelFilter::EquipmentCode(equipment_code.to_string()))
            .await?)
    }

    /// Fails on the first code that has no definition.
    pub async fn validate_channel_codes(&self, codes: &[String]) -> Result<Vec<ChannelDefinition>> {
        let mut definitions = Vec::with_capacity(codes.len());
        for code in codes {
            definitions.push(self.require(code, CacheMode::Cached).await?);
        }
        Ok(definitions)
    }

    /// Every code must resolve in the equipment hierarchy. Lookups run one at
    /// a time, in order.
    pub async fn validate_equipment_codes(&self, codes: &[String]) -> Result<()> {
        for code in codes {
            self.hierarchy.resolve(code).await?;
        }
        Ok(())
    }

    /// Makes `desired` the complete channel list of `equipment_code`.
    pub async fn reassign_equipment_channels(
        &self,
        equipment_code: &str,
        desired: &[String],
    ) -> Result<Reassignment> {
        self.validate_equipment_codes(&[equipment_code.to_string()])
            .await?;

        let mut seen = HashSet::new();
        let desired: Vec<String> = desired
            .iter()
            .filter(|code| seen.insert(code.as_str()))
            .cloned()
            .collect();

        let mut desired_definitions = Vec::with_capacity(desired.len());
        for code in &desired {
            desired_definitions.push(self.require(code, CacheMode::Bypass).await?);
        }

        let current = self.channels_for_equipment(equipment_code).await?;
        let current_codes: HashSet<&str> = current.iter().map(|def| def.code.as_str()).collect();
        let desired_codes: HashSet<&str> = desired.iter().map(String::as_str).collect();

        let mut removed = Vec::new();
        for mut definition in current.iter().cloned() {
            if desired_codes.contains(definition.code.as_str()) {
                continue;
            }
            definition.equipment_codes.retain(|code| code != equipment_code);
            self.repository.upsert(&definition).await?;
            self.cache.invalidate(&definition.code).await;
            removed.push(definition.code);
        }

        let mut added = Vec::new();
        for mut definition in desired_definitions {
            if current_codes.contains(definition.code.as_str()) {
                continue;
            }
            definition.equipment_codes.push(equipment_code.to_string());
            self.repository.upsert(&definition).await?;
            self.cache.invalidate(&definition.code).await;
            added.push(definition.code);
        }

        info!(
            equipment_code = %equipment_code,
            added = added.len(),
            removed = removed.len(),
            "equipment channels reassigned"
        );

        Ok(Reassignment {
            equipment_code: equipment_code.to_string(),
            added,
            removed,
        })
    }
}

fn validate_definition(definition: &ChannelDefinition) -> Result<()> {
    if definition.code.trim().is_empty() {
        return Err(ServiceError::EmptyChannelCode);
    }
    for (field, value) in [
        ("dimension", &definition.dimension),
        ("unit", &definition.unit),
    ] {
        if value.trim().is_empty() {
            return Err(ServiceError::MissingChannelField {
                code: definition.code.clone(),
                field,
            });
        }
    }
    Ok(())
}
