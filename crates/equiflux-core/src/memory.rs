//! In-process collaborators. Used by the test suites and by the CLI when no
//! database is configured.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::equipment::Equipment;
use crate::interfaces::{
    ChannelFilter, ChannelRepository, EquipmentDirectory, HierarchyClient, HierarchyError,
    HierarchyNode, MappingFilter, MappingRepository, RepositoryError,
};
use crate::types::{ChannelDefinition, MappingCandidate, ProvisionOutcome, StorageMapping};

#[derive(Debug, Default)]
pub struct InMemoryChannelRepository {
    definitions: RwLock<Vec<ChannelDefinition>>,
}

impl InMemoryChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: Vec<ChannelDefinition>) -> Self {
        Self {
            definitions: RwLock::new(definitions),
        }
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn get(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Option<ChannelDefinition>, RepositoryError> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(definitions.iter().find(|def| filter.matches(def)).cloned())
    }

    async fn query_many(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Vec<ChannelDefinition>, RepositoryError> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(definitions
            .iter()
            .filter(|def| filter.matches(def))
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        definition: &ChannelDefinition,
    ) -> Result<ChannelDefinition, RepositoryError> {
        let id = definition
            .id
            .ok_or_else(|| RepositoryError::MissingId(definition.code.clone()))?;

        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        match definitions.iter_mut().find(|existing| existing.id == Some(id)) {
            Some(existing) => *existing = definition.clone(),
            None => definitions.push(definition.clone()),
        }
        Ok(definition.clone())
    }

    async fn delete_many(&self, filter: &ChannelFilter) -> Result<u64, RepositoryError> {
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        let before = definitions.len();
        definitions.retain(|def| !filter.matches(def));
        Ok((before - definitions.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMappingRepository {
    // provision() must run its read-modify-write under one lock.
    mappings: Mutex<Vec<StorageMapping>>,
}

impl InMemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: Vec<StorageMapping>) -> Self {
        Self {
            mappings: Mutex::new(mappings),
        }
    }

    pub fn snapshot(&self) -> Vec<StorageMapping> {
        self.mappings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MappingRepository for InMemoryMappingRepository {
    async fn get(&self, filter: &MappingFilter) -> Result<Option<StorageMapping>, RepositoryError> {
        let mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(mappings.iter().find(|m| filter.matches(m)).cloned())
    }

    async fn query_many(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<StorageMapping>, RepositoryError> {
        let mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(mappings.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn upsert(&self, mapping: &StorageMapping) -> Result<StorageMapping, RepositoryError> {
        let mut mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        match mappings.iter_mut().find(|existing| existing.id == mapping.id) {
            Some(existing) => *existing = mapping.clone(),
            None => mappings.push(mapping.clone()),
        }
        Ok(mapping.clone())
    }

    async fn provision(
        &self,
        candidate: &MappingCandidate,
    ) -> Result<ProvisionOutcome, RepositoryError> {
        let mut mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = mappings.iter_mut().find(|m| {
            m.database_name == candidate.database_name
                && m.measurement_name == candidate.measurement_name
        });

        match existing {
            Some(mapping) => {
                if !mapping.covers(&candidate.equipment_code) {
                    mapping.equipment_codes.push(candidate.equipment_code.clone());
                }
                Ok(ProvisionOutcome {
                    mapping: mapping.clone(),
                    measurement_created: false,
                })
            }
            None => {
                let mapping = candidate.clone().into_mapping();
                mappings.push(mapping.clone());
                Ok(ProvisionOutcome {
                    mapping,
                    measurement_created: true,
                })
            }
        }
    }
}

/// Fixed hierarchy and equipment registry.
#[derive(Debug, Default)]
pub struct StaticHierarchy {
    nodes: HashMap<String, HierarchyNode>,
    equipment: HashMap<String, Equipment>,
}

impl StaticHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, wk_id: impl Into<String>, name: impl Into<String>) -> Self {
        let wk_id = wk_id.into();
        self.nodes.insert(
            wk_id.clone(),
            HierarchyNode {
                wk_id,
                name: name.into(),
                children: Vec::new(),
            },
        );
        self
    }

    pub fn with_equipment(mut self, equipment: Equipment) -> Self {
        self.equipment.insert(equipment.wkeid.clone(), equipment);
        self
    }

    pub fn insert_node(&mut self, node: HierarchyNode) {
        self.nodes.insert(node.wk_id.clone(), node);
    }

    pub fn insert_equipment(&mut self, equipment: Equipment) {
        self.equipment.insert(equipment.wkeid.clone(), equipment);
    }
}

#[async_trait]
impl HierarchyClient for StaticHierarchy {
    async fn resolve(&self, wk_id: &str) -> Result<HierarchyNode, HierarchyError> {
        self.nodes
            .get(wk_id)
            .cloned()
            .ok_or_else(|| HierarchyError::NotFound(wk_id.to_string()))
    }
}

#[async_trait]
impl EquipmentDirectory for StaticHierarchy {
    async fn equipment(&self, wkeid: &str) -> Result<Option<Equipment>, HierarchyError> {
        Ok(self.equipment.get(wkeid).cloned())
    }
}
