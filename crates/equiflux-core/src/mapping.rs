// crates/equiflux-core/src/mapping.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use equiflux_parser::{IndexedValue, ParsedChannelMeta, ParsedPayload, ParsedRows, RowFormat};
use serde_json::Value;

use crate::catalog::{CacheMode, ChannelDefinitionCatalog};
use crate::error::{Result, ServiceError};
use crate::timestamp::parse_timestamp;
use crate::types::{ChannelDefinitionIndex, FieldValue, WriteRow};

/// Validates declared channels against the catalog and turns parsed rows
/// into canonical write rows.
#[derive(Clone)]
pub struct ChannelMapper {
    catalog: ChannelDefinitionCatalog,
}

impl ChannelMapper {
    pub fn new(catalog: ChannelDefinitionCatalog) -> Self {
        Self { catalog }
    }

    /// Checks, in order: duplicate codes in the declaration, a catalog entry
    /// for every channel, then dimension and unit agreement.
    pub async fn resolve_channels(
        &self,
        channels: &[ParsedChannelMeta],
    ) -> Result<Vec<ChannelDefinitionIndex>> {
        let mut seen = HashSet::new();
        for channel in channels {
            if !seen.insert(channel.code.to_ascii_lowercase()) {
                return Err(ServiceError::DuplicateChannel {
                    code: channel.code.clone(),
                });
            }
        }

        let mut resolved = Vec::with_capacity(channels.len());
        for channel in channels {
            let definition = self
                .catalog
                .get_by_code(&channel.code, CacheMode::Cached)
                .await?
                .ok_or_else(|| ServiceError::UndefinedChannel {
                    code: channel.code.clone(),
                })?;

            check_matches(&channel.code, "dimension", &definition.dimension, &channel.dimension)?;
            check_matches(&channel.code, "unit", &definition.unit, &channel.unit)?;

            resolved.push(ChannelDefinitionIndex::new(channel.index, definition)?);
        }
        Ok(resolved)
    }

    pub async fn map_payload(&self, payload: &ParsedPayload) -> Result<Vec<WriteRow>> {
        let channels = self.resolve_channels(&payload.channels).await?;
        map_rows(&channels, &payload.rows)
    }
}

fn check_matches(code: &str, field: &'static str, expected: &str, actual: &str) -> Result<()> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(ServiceError::ChannelMismatch {
            code: code.to_string(),
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Maps one row group with channels already resolved by
/// [`ChannelMapper::resolve_channels`].
pub fn map_rows(channels: &[ChannelDefinitionIndex], rows: &ParsedRows) -> Result<Vec<WriteRow>> {
    match &rows.rows {
        RowFormat::Implicit(rows) => rows
            .iter()
            .enumerate()
            .map(|(row_index, values)| map_implicit_row(channels, row_index, values))
            .collect(),
        RowFormat::Explicit(rows) => {
            if channels.len() < 2 {
                return Err(ServiceError::TooFewChannels {
                    count: channels.len(),
                });
            }
            let by_index: HashMap<usize, &ChannelDefinitionIndex> =
                channels.iter().map(|channel| (channel.index, channel)).collect();
            rows.iter()
                .enumerate()
                .map(|(row_index, values)| map_explicit_row(&by_index, row_index, values))
                .collect()
        }
    }
}

fn map_implicit_row(
    channels: &[ChannelDefinitionIndex],
    row_index: usize,
    values: &[Value],
) -> Result<WriteRow> {
    if values.len() != channels.len() {
        return Err(ServiceError::RowLengthMismatch {
            row_index,
            expected: channels.len(),
            actual: values.len(),
        });
    }

    let mut builder = RowBuilder::new(row_index);
    for (channel, value) in channels.iter().zip(values) {
        builder.push(channel, value)?;
    }
    builder.finish()
}

fn map_explicit_row(
    by_index: &HashMap<usize, &ChannelDefinitionIndex>,
    row_index: usize,
    values: &[IndexedValue],
) -> Result<WriteRow> {
    let mut seen = HashSet::with_capacity(values.len());
    let mut builder = RowBuilder::new(row_index);

    for entry in values {
        if !seen.insert(entry.index) {
            return Err(ServiceError::DuplicateIndex {
                row_index,
                index: entry.index,
            });
        }
        let channel = by_index
            .get(&entry.index)
            .ok_or(ServiceError::UndeclaredIndex {
                row_index,
                index: entry.index,
            })?;
        builder.push(channel, &entry.value)?;
    }
    builder.finish()
}

struct RowBuilder {
    row_index: usize,
    timestamp: Option<DateTime<Utc>>,
    fields: BTreeMap<String, FieldValue>,
}

impl RowBuilder {
    fn new(row_index: usize) -> Self {
        Self {
            row_index,
            timestamp: None,
            fields: BTreeMap::new(),
        }
    }

    fn push(&mut self, channel: &ChannelDefinitionIndex, value: &Value) -> Result<()> {
        if channel.is_time() {
            return match value {
                Value::Null => Ok(()),
                Value::String(raw) => {
                    self.timestamp = Some(parse_timestamp(raw)?);
                    Ok(())
                }
                other => Err(ServiceError::InvalidTimestamp {
                    value: other.to_string(),
                    reason: "time values must be strings".to_string(),
                }),
            };
        }

        let converted =
            FieldValue::from_json(value).map_err(|_| ServiceError::UnsupportedValue {
                row_index: self.row_index,
                code: channel.definition.code.clone(),
            })?;
        if let Some(field) = converted {
            self.fields.insert(channel.field_name.clone(), field);
        }
        Ok(())
    }

    fn finish(self) -> Result<WriteRow> {
        let timestamp = self.timestamp.ok_or(ServiceError::MissingTime {
            row_index: self.row_index,
        })?;
        Ok(WriteRow {
            timestamp,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelDefinition;
    use equiflux_parser::DataFormat;
    use serde_json::json;

    fn channels() -> Vec<ChannelDefinitionIndex> {
        vec![
            ChannelDefinitionIndex::new(0, ChannelDefinition::new("time", "time", "unitless"))
                .unwrap(),
            ChannelDefinitionIndex::new(
                1,
                ChannelDefinition::new("AirPressure", "pressure", "kPa"),
            )
            .unwrap(),
        ]
    }

    fn implicit(rows: Vec<Vec<Value>>) -> ParsedRows {
        ParsedRows {
            equipment_id: None,
            rows: RowFormat::Implicit(rows),
        }
    }

    fn explicit(rows: Vec<Vec<(usize, Value)>>) -> ParsedRows {
        ParsedRows {
            equipment_id: None,
            rows: RowFormat::Explicit(
                rows.into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|(index, value)| IndexedValue { index, value })
                            .collect()
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn implicit_rows_map_positionally() {
        let rows = implicit(vec![vec![json!("2019-08-12T00:00:00Z"), json!(101.3)]]);
        let mapped = map_rows(&channels(), &rows).unwrap();
        assert_eq!(mapped.len(), 1);
        assert_eq!(
            mapped[0].fields.get("AirPressure.kPa"),
            Some(&FieldValue::Float(101.3))
        );
        assert!(!mapped[0].fields.contains_key("time"));
    }

    #[test]
    fn implicit_length_mismatch_is_rejected() {
        let rows = implicit(vec![vec![json!("2019-08-12T00:00:00Z")]]);
        let err = map_rows(&channels(), &rows).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RowLengthMismatch {
                row_index: 0,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn explicit_rows_are_sparse() {
        let rows = explicit(vec![
            vec![(0, json!("2019-08-12T00:00:00Z")), (1, json!(5))],
            vec![(0, json!("2019-08-12T00:00:01Z"))],
        ]);
        let mapped = map_rows(&channels(), &rows).unwrap();
        assert_eq!(mapped[0].fields.len(), 1);
        assert!(mapped[1].fields.is_empty());
        assert_eq!(rows.data_format(), DataFormat::Explicit);
    }

    #[test]
    fn explicit_rows_reject_duplicate_and_undeclared_indices() {
        let rows = explicit(vec![vec![
            (0, json!("2019-08-12T00:00:00Z")),
            (1, json!(5)),
            (1, json!(6)),
        ]]);
        let err = map_rows(&channels(), &rows).unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateIndex { index: 1, .. }));

        let rows = explicit(vec![vec![(0, json!("2019-08-12T00:00:00Z")), (7, json!(5))]]);
        let err = map_rows(&channels(), &rows).unwrap_err();
        assert!(matches!(err, ServiceError::UndeclaredIndex { index: 7, .. }));
    }

    #[test]
    fn explicit_rows_need_two_channels() {
        let only_time = vec![channels().remove(0)];
        let err = map_rows(&only_time, &explicit(vec![])).unwrap_err();
        assert!(matches!(err, ServiceError::TooFewChannels { count: 1 }));
    }

    #[test]
    fn rows_without_time_are_rejected() {
        let rows = implicit(vec![vec![Value::Null, json!(1)]]);
        let err = map_rows(&channels(), &rows).unwrap_err();
        assert!(matches!(err, ServiceError::MissingTime { row_index: 0 }));
    }

    #[test]
    fn null_values_produce_no_field() {
        let rows = implicit(vec![vec![json!("2019-08-12T00:00:00Z"), Value::Null]]);
        let mapped = map_rows(&channels(), &rows).unwrap();
        assert!(mapped[0].fields.is_empty());
    }

    #[test]
    fn numeric_time_is_rejected() {
        let rows = implicit(vec![vec![json!(1565568000), json!(1)]]);
        let err = map_rows(&channels(), &rows).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTimestamp { .. }));
    }
}
