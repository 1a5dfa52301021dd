//! Query construction, channel validation and storage routing for equipment
//! time-series data.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod equipment;
pub mod error;
pub mod fields;
pub mod interfaces;
pub mod mapping;
pub mod memory;
pub mod query;
pub mod resolver;
pub mod service;
pub mod timestamp;
pub mod types;

pub use cache::{InMemoryTtlCache, NoopCache, TtlCache};
pub use catalog::{CacheMode, ChannelDefinitionCatalog, Reassignment};
pub use config::ServiceConfig;
pub use equipment::{validate_wkeid, Classification, ClassificationKind, Equipment};
pub use error::{ErrorKind, Result, ServiceError};
pub use mapping::{map_rows, ChannelMapper};
pub use query::{
    Aggregation, EpisodeFilter, FillPolicy, GroupBy, MathFunction, Query, QueryBuilder,
};
pub use resolver::StoragePathResolver;
pub use service::{
    ChannelDataResponse, ChannelDataService, ChannelSeries, MathRequest, ReadRequest,
    ResponseColumn, WriteSummary,
};
pub use timestamp::{parse_timestamp, unix_nanos, unix_nanos_string, TimePeriod};
pub use types::{
    ChannelDefinition, ChannelDefinitionIndex, ChannelDescription, FieldValue, InfluxPath,
    MappingCandidate, MappingStatus, Operation, ProvisionOutcome, StorageMapping, WriteRow,
};
