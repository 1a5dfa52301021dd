use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParserError;
use crate::formats::{detect_format, parse_rows};
use crate::model::{ParsedBulkPayload, ParsedChannelMeta, ParsedPayload, ParsedRows};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireChannel {
    /// Wire position of the channel; defaults to its position in the meta array.
    #[serde(default)]
    pub index: Option<i64>,
    pub code: String,
    #[serde(default)]
    pub uom: String,
    #[serde(default)]
    pub dimension: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadMeta {
    #[serde(default)]
    pub channels: Vec<WireChannel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub meta: PayloadMeta,
    #[serde(default)]
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRows {
    pub equipment_id: String,
    #[serde(default)]
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkChannelPayload {
    pub meta: PayloadMeta,
    #[serde(default)]
    pub equipments: Vec<EquipmentRows>,
}

pub fn parse_channel_meta(channels: &[WireChannel]) -> Result<Vec<ParsedChannelMeta>, ParserError> {
    let mut codes = HashSet::new();
    let mut by_index: HashMap<usize, &str> = HashMap::new();
    let mut parsed = Vec::with_capacity(channels.len());

    for (position, channel) in channels.iter().enumerate() {
        let code = channel.code.trim();
        if code.is_empty() {
            return Err(ParserError::EmptyChannelCode { position });
        }
        // Codes are compared case-insensitively, ahead of any index check.
        if !codes.insert(code.to_ascii_lowercase()) {
            return Err(ParserError::DuplicateChannel {
                code: code.to_string(),
            });
        }

        let index = match channel.index {
            None => position,
            Some(raw) => usize::try_from(raw).map_err(|_| ParserError::InvalidChannelIndex {
                code: code.to_string(),
                index: raw,
            })?,
        };

        if let Some(first) = by_index.insert(index, code) {
            return Err(ParserError::DuplicateChannelIndex {
                index,
                first: first.to_string(),
                second: code.to_string(),
            });
        }

        parsed.push(ParsedChannelMeta {
            index,
            code: code.to_string(),
            unit: channel.uom.trim().to_string(),
            dimension: channel.dimension.trim().to_string(),
        });
    }

    Ok(parsed)
}

pub fn parse_payload(payload: &ChannelPayload) -> Result<ParsedPayload, ParserError> {
    let channels = parse_channel_meta(&payload.meta.channels)?;
    let format = detect_format(&payload.rows)?;
    let rows = parse_rows(&payload.rows, format)?;

    Ok(ParsedPayload {
        channels,
        rows: ParsedRows {
            equipment_id: None,
            rows,
        },
    })
}

pub fn parse_payload_str(content: &str) -> Result<ParsedPayload, ParserError> {
    let payload: ChannelPayload = serde_json::from_str(content)?;
    parse_payload(&payload)
}

/// Parses a multi-equipment payload. The row encoding is decided once for the
/// whole request and every equipment's rows must use it.
pub fn parse_bulk_payload(payload: &BulkChannelPayload) -> Result<ParsedBulkPayload, ParserError> {
    let channels = parse_channel_meta(&payload.meta.channels)?;
    let format = detect_format(payload.equipments.iter().flat_map(|group| group.rows.iter()))?;

    let equipments = payload
        .equipments
        .iter()
        .map(|group| {
            parse_rows(&group.rows, format)
                .map(|rows| ParsedRows {
                    equipment_id: Some(group.equipment_id.clone()),
                    rows,
                })
                .map_err(|err| ParserError::in_equipment(&group.equipment_id, err))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedBulkPayload {
        channels,
        format,
        equipments,
    })
}

pub fn parse_bulk_payload_str(content: &str) -> Result<ParsedBulkPayload, ParserError> {
    let payload: BulkChannelPayload = serde_json::from_str(content)?;
    parse_bulk_payload(&payload)
}
