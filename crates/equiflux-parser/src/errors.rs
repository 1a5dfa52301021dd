use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel at position {position} has an empty code")]
    EmptyChannelCode { position: usize },

    #[error("duplicate channel '{code}' declared in meta")]
    DuplicateChannel { code: String },

    #[error("channel '{code}' declares invalid index {index}")]
    InvalidChannelIndex { code: String, index: i64 },

    #[error("channel index {index} is declared by both '{first}' and '{second}'")]
    DuplicateChannelIndex {
        index: usize,
        first: String,
        second: String,
    },

    #[error("row {row_index} is malformed: {message}")]
    MalformedRow { row_index: usize, message: String },

    #[error("equipment '{equipment_id}': {source}")]
    Equipment {
        equipment_id: String,
        #[source]
        source: Box<ParserError>,
    },
}

impl ParserError {
    pub(crate) fn malformed(row_index: usize, message: impl Into<String>) -> Self {
        Self::MalformedRow {
            row_index,
            message: message.into(),
        }
    }

    pub(crate) fn in_equipment(equipment_id: &str, source: ParserError) -> Self {
        Self::Equipment {
            equipment_id: equipment_id.to_string(),
            source: Box::new(source),
        }
    }
}
