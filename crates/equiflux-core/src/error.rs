// crates/equiflux-core/src/error.rs

use chrono::{DateTime, Utc};
use equiflux_parser::ParserError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::interfaces::{HierarchyError, HistorianError, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad client input. Never retried.
    Validation,
    NotFound,
    /// Downstream or internal failure, surfaced as an opaque error.
    Server,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Server => "server",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Server => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("channel code must not be empty")]
    EmptyChannelCode,

    #[error("channel '{code}' must declare a non-empty {field}")]
    MissingChannelField { code: String, field: &'static str },

    #[error("channel '{code}' already carries id {id}; ids are assigned on create")]
    IdAlreadyAssigned { code: String, id: Uuid },

    #[error("channel code '{code}' already exists in the channel catalog")]
    DuplicateChannelCode { code: String },

    #[error("duplicate channel '{code}' declared in meta")]
    DuplicateChannel { code: String },

    #[error("channel '{code}' is not defined in the channel catalog")]
    UndefinedChannel { code: String },

    #[error("channel '{code}' {field} mismatch: expected '{expected}', got '{actual}'")]
    ChannelMismatch {
        code: String,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("row {row_index} has {actual} values but {expected} channels were declared")]
    RowLengthMismatch {
        row_index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("explicit rows require at least two declared channels, found {count}")]
    TooFewChannels { count: usize },

    #[error("row {row_index} repeats channel index {index}")]
    DuplicateIndex { row_index: usize, index: usize },

    #[error("row {row_index} references undeclared channel index {index}")]
    UndeclaredIndex { row_index: usize, index: usize },

    #[error("row {row_index} has an unsupported value for channel '{code}'")]
    UnsupportedValue { row_index: usize, code: String },

    #[error("row {row_index} has no time value")]
    MissingTime { row_index: usize },

    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("time period start {start} is after end {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid fill policy '{0}'")]
    InvalidFillPolicy(String),

    #[error("invalid group-by interval '{0}'")]
    InvalidGroupInterval(String),

    #[error("unknown aggregation function '{0}'")]
    InvalidAggregation(String),

    #[error("unknown math function '{0}'")]
    InvalidMathFunction(String),

    #[error("invalid equipment id '{0}': expected '<material>:<serial>'")]
    InvalidEquipmentId(String),

    #[error(
        "storage mapping for equipment '{wkeid}' (equipment code '{equipment_code}') is inactive; \
         contact {support_contact} to enable writes"
    )]
    InactiveMapping {
        wkeid: String,
        equipment_code: String,
        support_contact: String,
    },

    #[error("payload rejected: {0}")]
    Payload(#[source] ParserError),

    #[error("channel '{code}' was not found")]
    ChannelNotFound { code: String },

    #[error("code '{code}' was not found in the equipment hierarchy")]
    HierarchyCodeNotFound { code: String },

    #[error("equipment '{wkeid}' was not found")]
    EquipmentNotFound { wkeid: String },

    #[error("no storage path can be resolved for equipment '{wkeid}'")]
    NoStoragePath { wkeid: String },

    #[error("no storage mapping exists for equipment code '{equipment_code}'")]
    MappingNotFound { equipment_code: String },

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error("hierarchy lookup failed: {0}")]
    Hierarchy(String),

    #[error("historian failure: {0}")]
    Historian(#[from] HistorianError),

    #[error("could not provision a storage mapping for equipment code '{equipment_code}': {reason}")]
    ProvisioningFailed {
        equipment_code: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        use ServiceError::*;

        match self {
            EmptyChannelCode
            | MissingChannelField { .. }
            | IdAlreadyAssigned { .. }
            | DuplicateChannelCode { .. }
            | DuplicateChannel { .. }
            | UndefinedChannel { .. }
            | ChannelMismatch { .. }
            | RowLengthMismatch { .. }
            | TooFewChannels { .. }
            | DuplicateIndex { .. }
            | UndeclaredIndex { .. }
            | UnsupportedValue { .. }
            | MissingTime { .. }
            | InvalidTimestamp { .. }
            | InvalidPeriod { .. }
            | InvalidFillPolicy(_)
            | InvalidGroupInterval(_)
            | InvalidAggregation(_)
            | InvalidMathFunction(_)
            | InvalidEquipmentId(_)
            | InactiveMapping { .. }
            | Payload(_) => ErrorKind::Validation,

            ChannelNotFound { .. }
            | HierarchyCodeNotFound { .. }
            | EquipmentNotFound { .. }
            | NoStoragePath { .. }
            | MappingNotFound { .. } => ErrorKind::NotFound,

            UnsupportedQuery(_)
            | Repository(_)
            | Hierarchy(_)
            | Historian(_)
            | ProvisioningFailed { .. }
            | Config(_) => ErrorKind::Server,
        }
    }

    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        use ServiceError::*;

        match self {
            EmptyChannelCode => "EMPTY_CHANNEL_CODE",
            MissingChannelField { .. } => "MISSING_CHANNEL_FIELD",
            IdAlreadyAssigned { .. } => "ID_ALREADY_ASSIGNED",
            DuplicateChannelCode { .. } => "DUPLICATE_CHANNEL_CODE",
            DuplicateChannel { .. } => "DUPLICATE_CHANNEL",
            UndefinedChannel { .. } => "UNDEFINED_CHANNEL",
            ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            RowLengthMismatch { .. } => "ROW_LENGTH_MISMATCH",
            TooFewChannels { .. } => "TOO_FEW_CHANNELS",
            DuplicateIndex { .. } => "DUPLICATE_INDEX",
            UndeclaredIndex { .. } => "UNDECLARED_INDEX",
            UnsupportedValue { .. } => "UNSUPPORTED_VALUE",
            MissingTime { .. } => "MISSING_TIME",
            InvalidTimestamp { .. } => "INVALID_TIMESTAMP",
            InvalidPeriod { .. } => "INVALID_PERIOD",
            InvalidFillPolicy(_) => "INVALID_FILL_POLICY",
            InvalidGroupInterval(_) => "INVALID_GROUP_INTERVAL",
            InvalidAggregation(_) => "INVALID_AGGREGATION",
            InvalidMathFunction(_) => "INVALID_MATH_FUNCTION",
            InvalidEquipmentId(_) => "INVALID_EQUIPMENT_ID",
            InactiveMapping { .. } => "INACTIVE_MAPPING",
            Payload(_) => "INVALID_PAYLOAD",
            ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            HierarchyCodeNotFound { .. } => "HIERARCHY_CODE_NOT_FOUND",
            EquipmentNotFound { .. } => "EQUIPMENT_NOT_FOUND",
            NoStoragePath { .. } => "NO_STORAGE_PATH",
            MappingNotFound { .. } => "MAPPING_NOT_FOUND",
            UnsupportedQuery(_) => "UNSUPPORTED_QUERY",
            Repository(_) => "REPOSITORY_FAILURE",
            Hierarchy(_) => "HIERARCHY_FAILURE",
            Historian(_) => "HISTORIAN_FAILURE",
            ProvisioningFailed { .. } => "PROVISIONING_FAILED",
            Config(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<ParserError> for ServiceError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::DuplicateChannel { code } => ServiceError::DuplicateChannel { code },
            other => ServiceError::Payload(other),
        }
    }
}

impl From<HierarchyError> for ServiceError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::NotFound(code) => ServiceError::HierarchyCodeNotFound { code },
            HierarchyError::Transport(message) => ServiceError::Hierarchy(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
