// crates/equiflux-core/src/types.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::fields;

/// Unit marker for channels whose field name is the bare code.
pub const UNITLESS: &str = "unitless";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDefinition {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code: String,
    pub dimension: String,
    pub unit: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub legal_classification: Option<String>,
    #[serde(default)]
    pub equipment_codes: Vec<String>,
}

impl ChannelDefinition {
    pub fn new(
        code: impl Into<String>,
        dimension: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            code: code.into(),
            dimension: dimension.into(),
            unit: unit.into(),
            display_name: None,
            legal_classification: None,
            equipment_codes: Vec::new(),
        }
    }

    pub fn with_equipment_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equipment_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Storage field name for this channel.
    pub fn field_name(&self) -> Result<String> {
        fields::field_name(&self.code, &self.unit)
    }

    pub fn is_time(&self) -> bool {
        self.code.eq_ignore_ascii_case("time")
    }
}

/// A validated catalog definition paired with the wire position it was
/// declared at. Built once per request and reused for every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDefinitionIndex {
    pub index: usize,
    pub definition: ChannelDefinition,
    pub field_name: String,
}

impl ChannelDefinitionIndex {
    pub fn new(index: usize, definition: ChannelDefinition) -> Result<Self> {
        let field_name = definition.field_name()?;
        Ok(Self {
            index,
            definition,
            field_name,
        })
    }

    pub fn is_time(&self) -> bool {
        self.definition.is_time()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelDescription {
    pub code: String,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Enabled,
    Disabled,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Enabled => "enabled",
            MappingStatus::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" => Some(MappingStatus::Enabled),
            "disabled" => Some(MappingStatus::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted routing of equipment codes to a database/measurement pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMapping {
    pub id: Uuid,
    pub database_name: String,
    pub measurement_name: String,
    pub equipment_codes: Vec<String>,
    pub status: MappingStatus,
    pub brand_code: String,
    pub technology_code: String,
    pub brand_name: String,
    pub technology_name: String,
}

impl StorageMapping {
    pub fn is_enabled(&self) -> bool {
        self.status == MappingStatus::Enabled
    }

    pub fn covers(&self, equipment_code: &str) -> bool {
        self.equipment_codes.iter().any(|code| code == equipment_code)
    }

    pub fn path_for(&self, equipment_code: &str) -> InfluxPath {
        InfluxPath {
            technology: self.database_name.clone(),
            brand: self.measurement_name.clone(),
            equipment_code: equipment_code.to_string(),
        }
    }
}

/// Path derived from the equipment hierarchy for an equipment code that has
/// no mapping yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingCandidate {
    pub database_name: String,
    pub measurement_name: String,
    pub equipment_code: String,
    pub brand_code: String,
    pub technology_code: String,
    pub brand_name: String,
    pub technology_name: String,
}

impl MappingCandidate {
    /// A fresh mapping for this candidate. New pairs always start disabled.
    pub fn into_mapping(self) -> StorageMapping {
        StorageMapping {
            id: Uuid::new_v4(),
            database_name: self.database_name,
            measurement_name: self.measurement_name,
            equipment_codes: vec![self.equipment_code],
            status: MappingStatus::Disabled,
            brand_code: self.brand_code,
            technology_code: self.technology_code,
            brand_name: self.brand_name,
            technology_name: self.technology_name,
        }
    }

    pub fn path(&self) -> InfluxPath {
        InfluxPath {
            technology: self.database_name.clone(),
            brand: self.measurement_name.clone(),
            equipment_code: self.equipment_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub mapping: StorageMapping,
    /// `false` when an existing measurement was reused.
    pub measurement_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxPath {
    /// Database name.
    pub technology: String,
    /// Measurement name.
    pub brand: String,
    pub equipment_code: String,
}

impl fmt::Display for InfluxPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.technology, self.brand, self.equipment_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

/// Wire values that have no field representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnconvertibleValue {
    Nested,
    Number,
}

impl FieldValue {
    /// Converts a scalar wire value; `null` maps to `None`.
    pub(crate) fn from_json(value: &Value) -> std::result::Result<Option<Self>, UnconvertibleValue> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(flag) => Ok(Some(FieldValue::Boolean(*flag))),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Some(FieldValue::Integer(int)))
                } else {
                    number
                        .as_f64()
                        .map(|float| Some(FieldValue::Float(float)))
                        .ok_or(UnconvertibleValue::Number)
                }
            }
            Value::String(text) => Ok(Some(FieldValue::Text(text.clone()))),
            Value::Array(_) | Value::Object(_) => Err(UnconvertibleValue::Nested),
        }
    }
}

/// Canonical row handed to the historian writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRow {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_values_follow_json_types() {
        assert_eq!(FieldValue::from_json(&json!(null)), Ok(None));
        assert_eq!(
            FieldValue::from_json(&json!(12)),
            Ok(Some(FieldValue::Integer(12)))
        );
        assert_eq!(
            FieldValue::from_json(&json!(1.5)),
            Ok(Some(FieldValue::Float(1.5)))
        );
        assert_eq!(
            FieldValue::from_json(&json!("open")),
            Ok(Some(FieldValue::Text("open".into())))
        );
        assert_eq!(
            FieldValue::from_json(&json!([1, 2])),
            Err(UnconvertibleValue::Nested)
        );
        assert_eq!(
            FieldValue::from_json(&json!({"v": 1})),
            Err(UnconvertibleValue::Nested)
        );
    }

    #[test]
    fn mapping_status_parses_case_insensitively() {
        assert_eq!(MappingStatus::parse("Enabled"), Some(MappingStatus::Enabled));
        assert_eq!(MappingStatus::parse(" disabled "), Some(MappingStatus::Disabled));
        assert_eq!(MappingStatus::parse("paused"), None);
    }
}
