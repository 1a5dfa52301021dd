#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use equiflux_core::interfaces::{
    EquipmentDirectory, HierarchyClient, HierarchyError, HierarchyNode, HistorianClient,
    HistorianError, HistorianRow, HistorianWriter, Series,
};
use equiflux_core::memory::{InMemoryChannelRepository, InMemoryMappingRepository, StaticHierarchy};
use equiflux_core::{
    ChannelDataService, ChannelDefinition, ChannelDefinitionCatalog, ClassificationKind,
    Equipment, InMemoryTtlCache, InfluxPath, MappingStatus, Query, StoragePathResolver,
    StorageMapping, WriteRow,
};
use serde_json::json;
use uuid::Uuid;

pub const BLENDER: &str = "100196736:SBF62412A0281";
pub const PUMP: &str = "100200111:PMP0001";
pub const ORPHAN: &str = "100300222:ORP0001";
pub const UNMAPPED: &str = "100400333:NEW0001";

pub const TECHNOLOGY: &str = "DXJ_WPS_BLENDING_EQUIPMENT";
pub const BRAND: &str = "WS-63_STIMULATION_BLENDER_PROP";
pub const SUPPORT: &str = "blending data desk";

pub fn hierarchy() -> StaticHierarchy {
    StaticHierarchy::new()
        .with_node("BR-63", "WS-63 Stimulation Blender Prop")
        .with_node("TE-DXJ", "DXJ WPS Blending Equipment")
        .with_node("BR-77", "Frac Pump  77")
        .with_node("EQ-BLENDER", "Blender")
        .with_node("EQ-PUMP", "Pump")
        .with_node("EQ-ORPHAN", "Orphan")
        .with_node("EQ-NEW", "New Pump")
        .with_equipment(
            Equipment::new(BLENDER, "100196736")
                .with_classification(ClassificationKind::EquipmentSystem, "EQ-BLENDER")
                .with_classification(ClassificationKind::Brand, "BR-63")
                .with_classification(ClassificationKind::Technology, "TE-DXJ"),
        )
        .with_equipment(
            Equipment::new(PUMP, "100200111")
                .with_classification(ClassificationKind::EquipmentSystem, "EQ-PUMP")
                .with_classification(ClassificationKind::Brand, "BR-63")
                .with_classification(ClassificationKind::Technology, "TE-DXJ"),
        )
        .with_equipment(
            Equipment::new(ORPHAN, "100300222")
                .with_classification(ClassificationKind::EquipmentSystem, "EQ-ORPHAN"),
        )
        .with_equipment(
            Equipment::new(UNMAPPED, "100400333")
                .with_classification(ClassificationKind::EquipmentSystem, "EQ-NEW")
                .with_classification(ClassificationKind::Brand, "BR-77")
                .with_classification(ClassificationKind::Technology, "TE-DXJ"),
        )
}

pub fn definitions() -> Vec<ChannelDefinition> {
    let mut definitions = vec![
        ChannelDefinition::new("time", "time", "unitless"),
        ChannelDefinition::new("AirPressure", "pressure", "kPa")
            .with_equipment_codes(["EQ-BLENDER"]),
        ChannelDefinition::new("DischargeRate", "flow rate", "m3/sec"),
        ChannelDefinition::new("PumpState", "state", "unitless").with_display_name("Pump state"),
    ];
    for definition in &mut definitions {
        definition.id = Some(Uuid::new_v4());
    }
    definitions
}

pub fn enabled_mapping(equipment_codes: &[&str]) -> StorageMapping {
    StorageMapping {
        id: Uuid::new_v4(),
        database_name: TECHNOLOGY.to_string(),
        measurement_name: BRAND.to_string(),
        equipment_codes: equipment_codes.iter().map(|c| c.to_string()).collect(),
        status: MappingStatus::Enabled,
        brand_code: "BR-63".to_string(),
        technology_code: "TE-DXJ".to_string(),
        brand_name: "WS-63 Stimulation Blender Prop".to_string(),
        technology_name: "DXJ WPS Blending Equipment".to_string(),
    }
}

pub fn field_key_rows(keys: &[&str]) -> Vec<HistorianRow> {
    keys.iter()
        .filter_map(|key| {
            json!({ "fieldKey": key, "fieldType": "float" })
                .as_object()
                .cloned()
        })
        .collect()
}

/// Hierarchy wrapper that counts every call it forwards.
pub struct CountingHierarchy {
    inner: StaticHierarchy,
    pub resolve_calls: AtomicUsize,
    pub equipment_calls: AtomicUsize,
}

impl CountingHierarchy {
    pub fn new(inner: StaticHierarchy) -> Self {
        Self {
            inner,
            resolve_calls: AtomicUsize::new(0),
            equipment_calls: AtomicUsize::new(0),
        }
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn equipment_count(&self) -> usize {
        self.equipment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HierarchyClient for CountingHierarchy {
    async fn resolve(&self, wk_id: &str) -> Result<HierarchyNode, HierarchyError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(wk_id).await
    }
}

#[async_trait]
impl EquipmentDirectory for CountingHierarchy {
    async fn equipment(&self, wkeid: &str) -> Result<Option<Equipment>, HierarchyError> {
        self.equipment_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.equipment(wkeid).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub path: InfluxPath,
    pub equipment_instance: String,
    pub rows: Vec<WriteRow>,
}

/// Historian double: canned responses in, every query and write recorded.
#[derive(Default)]
pub struct RecordingHistorian {
    pub field_keys: Mutex<Vec<HistorianRow>>,
    pub latest: Mutex<Option<DateTime<Utc>>>,
    pub series: Mutex<Vec<Series>>,
    pub queries: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<RecordedWrite>>,
    pub fail_writes: Mutex<bool>,
}

impl RecordingHistorian {
    pub fn set_field_keys(&self, keys: &[&str]) {
        *self.field_keys.lock().unwrap() = field_key_rows(keys);
    }

    pub fn set_latest(&self, latest: Option<DateTime<Utc>>) {
        *self.latest.lock().unwrap() = latest;
    }

    pub fn set_series(&self, series: Vec<Series>) {
        *self.series.lock().unwrap() = series;
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    fn record(&self, query: &Query) {
        self.queries.lock().unwrap().push(query.text().to_string());
    }
}

#[async_trait]
impl HistorianClient for RecordingHistorian {
    async fn execute_query(&self, query: &Query) -> Result<Vec<HistorianRow>, HistorianError> {
        self.record(query);
        Ok(self.field_keys.lock().unwrap().clone())
    }

    async fn execute_multi_series(&self, query: &Query) -> Result<Vec<Series>, HistorianError> {
        self.record(query);
        Ok(self.series.lock().unwrap().clone())
    }

    async fn latest_timestamp(
        &self,
        query: &Query,
    ) -> Result<Option<DateTime<Utc>>, HistorianError> {
        self.record(query);
        Ok(*self.latest.lock().unwrap())
    }
}

#[async_trait]
impl HistorianWriter for RecordingHistorian {
    async fn write_rows(
        &self,
        path: &InfluxPath,
        equipment_instance: &str,
        rows: &[WriteRow],
    ) -> Result<(), HistorianError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(HistorianError::Transport("connection refused".into()));
        }
        self.writes.lock().unwrap().push(RecordedWrite {
            path: path.clone(),
            equipment_instance: equipment_instance.to_string(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub service: ChannelDataService,
    pub catalog: ChannelDefinitionCatalog,
    pub resolver: StoragePathResolver,
    pub channels: Arc<InMemoryChannelRepository>,
    pub mappings: Arc<InMemoryMappingRepository>,
    pub hierarchy: Arc<CountingHierarchy>,
    pub historian: Arc<RecordingHistorian>,
}

pub fn harness(mappings: Vec<StorageMapping>) -> Harness {
    let channels = Arc::new(InMemoryChannelRepository::with_definitions(definitions()));
    let mappings = Arc::new(InMemoryMappingRepository::with_mappings(mappings));
    let hierarchy = Arc::new(CountingHierarchy::new(hierarchy()));
    let historian = Arc::new(RecordingHistorian::default());

    let catalog = ChannelDefinitionCatalog::new(
        channels.clone(),
        hierarchy.clone(),
        Arc::new(InMemoryTtlCache::<ChannelDefinition>::with_ttl_hours(24)),
    );
    let resolver = StoragePathResolver::new(
        mappings.clone(),
        hierarchy.clone(),
        Arc::new(InMemoryTtlCache::<StorageMapping>::with_ttl_hours(24)),
        SUPPORT,
    );
    let service = ChannelDataService::new(
        catalog.clone(),
        resolver.clone(),
        hierarchy.clone(),
        historian.clone(),
        historian.clone(),
        24,
    );

    Harness {
        service,
        catalog,
        resolver,
        channels,
        mappings,
        hierarchy,
        historian,
    }
}
