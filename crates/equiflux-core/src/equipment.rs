// crates/equiflux-core/src/equipment.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

static WKEID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+:[A-Za-z0-9_.\-]+$").expect("equipment id pattern is valid")
});

/// Checks the `<material>:<serial>` shape of a well-known equipment id.
pub fn validate_wkeid(wkeid: &str) -> Result<()> {
    if WKEID.is_match(wkeid) {
        Ok(())
    } else {
        Err(ServiceError::InvalidEquipmentId(wkeid.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationKind {
    EquipmentSystem,
    Brand,
    Technology,
}

impl ClassificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationKind::EquipmentSystem => "EquipmentSystem",
            ClassificationKind::Brand => "Brand",
            ClassificationKind::Technology => "Technology",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ClassificationKind,
    /// Well-known id of the node in the equipment hierarchy.
    pub code: String,
}

impl Classification {
    pub fn new(kind: ClassificationKind, code: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub wkeid: String,
    pub material_number: String,
    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl Equipment {
    pub fn new(wkeid: impl Into<String>, material_number: impl Into<String>) -> Self {
        Self {
            wkeid: wkeid.into(),
            material_number: material_number.into(),
            classifications: Vec::new(),
        }
    }

    pub fn with_classification(mut self, kind: ClassificationKind, code: impl Into<String>) -> Self {
        self.classifications.push(Classification::new(kind, code));
        self
    }

    pub fn classification(&self, kind: ClassificationKind) -> Option<&str> {
        self.classifications
            .iter()
            .find(|classification| classification.kind == kind)
            .map(|classification| classification.code.as_str())
            .filter(|code| !code.trim().is_empty())
    }

    pub fn equipment_code(&self) -> Option<&str> {
        self.classification(ClassificationKind::EquipmentSystem)
    }

    pub fn brand_code(&self) -> Option<&str> {
        self.classification(ClassificationKind::Brand)
    }

    pub fn technology_code(&self) -> Option<&str> {
        self.classification(ClassificationKind::Technology)
    }
}
