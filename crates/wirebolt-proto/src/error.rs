//! Errors raised by the wire codec and framer.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire-level data.
///
/// These are layer-local: the driver crate wraps them into its own
/// connection-scoped error taxonomy at the dispatcher boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The cursor ran out of bytes before a value could be fully read.
    #[error("truncated: needed {needed} bytes, had {available}")]
    Truncated {
        /// Bytes required to decode the value.
        needed: usize,
        /// Bytes actually remaining in the cursor.
        available: usize,
    },

    /// A `[string]` or `[long string]` was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A length-prefixed field declared a negative length where the wire
    /// format forbids it (everywhere except `[bytes]`, which uses negative
    /// lengths as null/unset sentinels).
    #[error("negative length not permitted here: {0}")]
    NegativeLength(i32),

    /// A frame body or declared length exceeded the configured ceiling.
    #[error("value of {actual} bytes exceeds the {limit}-byte limit")]
    ValueTooLarge {
        /// The configured ceiling.
        limit: u32,
        /// The length actually declared on the wire.
        actual: u32,
    },

    /// The opcode byte does not match any opcode in protocol version 4.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// The `RESULT` body's leading kind tag does not match a known kind.
    #[error("unknown RESULT kind: {0:#010x}")]
    UnknownResultKind(i32),

    /// The frame header's version byte did not match protocol version 4
    /// in the expected direction (request `0x04` / response `0x84`).
    #[error("unsupported protocol version byte: {0:#04x}")]
    UnsupportedVersion(u8),

    /// The compression flag was set on a frame but no algorithm was
    /// negotiated during the handshake.
    #[error("compression flag set without a negotiated algorithm")]
    CompressionNotNegotiated,

    /// The STARTUP body named a compression algorithm this build has no
    /// adapter for.
    #[error("unknown compression algorithm: {0}")]
    UnknownCompression(String),

    /// A column's `[bytes]` payload could not be decoded as its declared
    /// type.
    #[error("bad column data for type {type_name}: {reason}")]
    BadColumnData {
        /// Human-readable name of the column type that failed to decode.
        type_name: &'static str,
        /// What went wrong.
        reason: String,
    },
}
