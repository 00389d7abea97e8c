//! Wire codec and framing for the native protocol v4: primitive types,
//! per-opcode message bodies, the 9-byte frame header, and pluggable
//! frame-body compression.
//!
//! This crate is pure wire-format logic; it knows nothing about sockets,
//! stream-id allocation, or connection lifecycle. See `wirebolt-driver`
//! for the dispatcher that drives this codec over a real transport.

mod compression;
mod error;
mod frame;
mod message;
mod opcode;
mod primitive;
mod value;

pub use compression::{Compressor, resolve as resolve_compressor};
#[cfg(feature = "compression-lz4")]
pub use compression::Lz4Compressor;
#[cfg(feature = "compression-snappy")]
pub use compression::SnappyCompressor;
pub use error::CodecError;
pub use frame::{Frame, FrameHeader, HEADER_LEN};
pub use message::{
    BindValue, ColumnSpec, ErrorBody, Event, EventType, Execute, Payload, Prepare, Query,
    QueryFlags, QueryParams, Register, ResultBody, ResultMetadata, Startup, Supported,
};
pub use opcode::Opcode;
pub use primitive::{Consistency, MaybeBytes};
pub use value::{ColumnType, UdtField, Value, decode_value, encode_value};
