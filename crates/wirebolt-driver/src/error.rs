//! The driver's connection-scoped error taxonomy.

use thiserror::Error;
use wirebolt_proto::CodecError;

/// Errors surfaced by the dispatcher and session.
///
/// `is_fatal` distinguishes the kinds that tear a connection down (and
/// fail every outstanding waiter with the same kind) from the kinds that
/// are reported only to the caller that triggered them.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// Malformed wire bytes: UTF-8 failure, length underflow, or any
    /// other codec-layer decode failure. Fatal.
    #[error("bad data on the wire: {0}")]
    BadData(#[from] CodecError),

    /// An opcode, protocol version, or stream id violated the protocol's
    /// own rules (unknown opcode, response on an unallocated stream,
    /// compression flag without negotiation). Fatal.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The transport ended, or was closed by the caller. Fatal; every
    /// outstanding waiter completes with this kind.
    #[error("connection closed")]
    ConnectionClosed,

    /// The handshake did not reach `Ready` within the configured bound.
    /// Fatal.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// A well-formed `ERROR` response from the server. Not fatal; only
    /// the request that produced it is affected.
    #[error("server error {code:#06x}: {message}")]
    ServerError {
        /// The server's numeric error code.
        code: i32,
        /// Human-readable message from the server.
        message: String,
    },

    /// A caller-side parameter-binding mismatch, detected before any I/O
    /// occurs (wrong arity, or a value that does not fit the prepared
    /// statement's bind-parameter type). Not fatal.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// The caller asked for a feature this core does not implement
    /// (batch statements, result paging, or full authentication
    /// challenge/response). Not fatal.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl DriverError {
    /// `true` for kinds that terminate the connection and fail every
    /// outstanding waiter; `false` for kinds scoped to a single caller.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadData(_) | Self::ProtocolViolation(_) | Self::ConnectionClosed | Self::HandshakeTimeout(_)
        )
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::HandshakeTimeout(std::time::Duration::default()),
            _ => Self::ConnectionClosed,
        }
    }
}
