//! Wire-format parsing for equipment channel payloads.
//!
//! Nothing in this crate knows about the channel catalog; it only turns the
//! JSON boundary shapes into typed rows and reports structural problems.

pub mod errors;
pub mod formats;
pub mod model;
pub mod payload;

pub use errors::ParserError;
pub use formats::{detect_format, parse_rows};
pub use model::{
    DataFormat, IndexedValue, ParsedBulkPayload, ParsedChannelMeta, ParsedPayload, ParsedRows,
    RowFormat,
};
pub use payload::{
    parse_bulk_payload, parse_bulk_payload_str, parse_channel_meta, parse_payload,
    parse_payload_str, BulkChannelPayload, ChannelPayload, EquipmentRows, PayloadMeta,
    WireChannel,
};

#[cfg(test)]
mod tests;
