use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A channel as declared by the caller in the payload meta block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChannelMeta {
    pub index: usize,
    pub code: String,
    pub unit: String,
    pub dimension: String,
}

impl ParsedChannelMeta {
    pub fn is_time(&self) -> bool {
        self.code.eq_ignore_ascii_case("time")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    /// Row values line up positionally with the declared channels.
    Implicit,
    /// Rows carry sparse `[index, value]` pairs.
    Explicit,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Implicit => "implicit",
            DataFormat::Explicit => "explicit",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedValue {
    pub index: usize,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowFormat {
    Implicit(Vec<Vec<Value>>),
    Explicit(Vec<Vec<IndexedValue>>),
}

impl RowFormat {
    pub fn empty(format: DataFormat) -> Self {
        match format {
            DataFormat::Implicit => RowFormat::Implicit(Vec::new()),
            DataFormat::Explicit => RowFormat::Explicit(Vec::new()),
        }
    }

    pub fn data_format(&self) -> DataFormat {
        match self {
            RowFormat::Implicit(_) => DataFormat::Implicit,
            RowFormat::Explicit(_) => DataFormat::Explicit,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowFormat::Implicit(rows) => rows.len(),
            RowFormat::Explicit(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRows {
    /// Owning equipment for bulk payloads; `None` for single-equipment payloads.
    pub equipment_id: Option<String>,
    pub rows: RowFormat,
}

impl ParsedRows {
    pub fn data_format(&self) -> DataFormat {
        self.rows.data_format()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub channels: Vec<ParsedChannelMeta>,
    pub rows: ParsedRows,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBulkPayload {
    pub channels: Vec<ParsedChannelMeta>,
    pub format: DataFormat,
    pub equipments: Vec<ParsedRows>,
}
