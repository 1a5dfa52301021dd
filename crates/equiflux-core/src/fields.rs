//! Channel code + unit <-> storage field name conversion.

use crate::error::{Result, ServiceError};
use crate::query::Aggregation;
use crate::types::{ChannelDescription, UNITLESS};

/// `code.unit`, or the bare code for unitless channels.
pub fn encode_field_name(code: &str, unit: &str) -> String {
    if unit == UNITLESS {
        code.to_string()
    } else {
        format!("{code}.{unit}")
    }
}

/// Like [`encode_field_name`] but rejects an empty unit.
pub fn field_name(code: &str, unit: &str) -> Result<String> {
    if unit.trim().is_empty() {
        return Err(ServiceError::MissingChannelField {
            code: code.to_string(),
            field: "unit",
        });
    }
    Ok(encode_field_name(code, unit))
}

/// Splits on the last `.`. A code containing a dot decodes ambiguously.
pub fn decode_field_name(field_name: &str) -> ChannelDescription {
    match field_name.rsplit_once('.') {
        Some((code, unit)) if !code.is_empty() && !unit.is_empty() => ChannelDescription {
            code: code.to_string(),
            unit: unit.to_string(),
        },
        _ => ChannelDescription {
            code: field_name.to_string(),
            unit: UNITLESS.to_string(),
        },
    }
}

/// Removes the `func_` prefix that aggregated selections put on column aliases.
pub fn strip_aggregation_prefix(column: &str) -> Option<&str> {
    Aggregation::ALL.iter().find_map(|aggregation| {
        column
            .strip_prefix(aggregation.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|rest| !rest.is_empty())
    })
}
