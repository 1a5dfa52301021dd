use serde_json::Value;

use crate::errors::ParserError;
use crate::model::{DataFormat, IndexedValue, RowFormat};

/// Decides the row encoding from the first non-empty row.
///
/// Rows that are empty carry no information and are skipped; a payload with no
/// usable rows is treated as implicit.
pub fn detect_format<'a, I>(rows: I) -> Result<DataFormat, ParserError>
where
    I: IntoIterator<Item = &'a Value>,
{
    for (row_index, row) in rows.into_iter().enumerate() {
        let values = row
            .as_array()
            .ok_or_else(|| ParserError::malformed(row_index, "expected an array of values"))?;
        match values.first() {
            None => continue,
            Some(Value::Array(_)) => return Ok(DataFormat::Explicit),
            Some(_) => return Ok(DataFormat::Implicit),
        }
    }
    Ok(DataFormat::Implicit)
}

/// Parses every row with an already decided encoding.
pub fn parse_rows(rows: &[Value], format: DataFormat) -> Result<RowFormat, ParserError> {
    match format {
        DataFormat::Implicit => rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| parse_implicit_row(row_index, row))
            .collect::<Result<Vec<_>, _>>()
            .map(RowFormat::Implicit),
        DataFormat::Explicit => rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| parse_explicit_row(row_index, row))
            .collect::<Result<Vec<_>, _>>()
            .map(RowFormat::Explicit),
    }
}

fn row_values(row_index: usize, row: &Value) -> Result<&Vec<Value>, ParserError> {
    row.as_array()
        .ok_or_else(|| ParserError::malformed(row_index, "expected an array of values"))
}

fn parse_implicit_row(row_index: usize, row: &Value) -> Result<Vec<Value>, ParserError> {
    let values = row_values(row_index, row)?;
    if let Some(position) = values
        .iter()
        .position(|value| value.is_array() || value.is_object())
    {
        return Err(ParserError::malformed(
            row_index,
            format!("implicit rows hold scalar values, found a nested value at position {position}"),
        ));
    }
    Ok(values.clone())
}

fn parse_explicit_row(row_index: usize, row: &Value) -> Result<Vec<IndexedValue>, ParserError> {
    let values = row_values(row_index, row)?;
    values
        .iter()
        .map(|pair| parse_pair(row_index, pair))
        .collect()
}

fn parse_pair(row_index: usize, pair: &Value) -> Result<IndexedValue, ParserError> {
    let items = match pair.as_array() {
        Some(items) if items.len() == 2 => items,
        Some(items) => {
            return Err(ParserError::malformed(
                row_index,
                format!("explicit entries are [index, value] pairs, found {} items", items.len()),
            ))
        }
        None => {
            return Err(ParserError::malformed(
                row_index,
                "explicit rows hold [index, value] pairs, found a scalar value",
            ))
        }
    };

    let index = items[0]
        .as_u64()
        .and_then(|index| usize::try_from(index).ok())
        .ok_or_else(|| {
            ParserError::malformed(
                row_index,
                format!("pair index {} is not a non-negative integer", items[0]),
            )
        })?;

    Ok(IndexedValue {
        index,
        value: items[1].clone(),
    })
}
