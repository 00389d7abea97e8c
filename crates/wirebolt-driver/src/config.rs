//! Tunable configuration for the dispatcher and session.
//!
//! Neither struct parses environment variables, files, or CLI flags —
//! wiring a config source is the caller's job — but the structs and
//! their defaults are part of this crate's public surface, independent
//! of how the embedding application sources them.

use std::time::Duration;

/// Tunables for a single [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Ceiling on a frame body's declared length (invariant iv). A frame
    /// header declaring more than this is a protocol violation.
    pub max_frame_body_len: u32,
    /// Size of the stream-id pool; also the maximum number of requests
    /// that may be in flight simultaneously on one connection.
    pub stream_id_pool_size: u16,
}

/// Default frame-body ceiling: 256 MiB.
pub const DEFAULT_MAX_FRAME_BODY_LEN: u32 = 256 * 1024 * 1024;

/// Default stream-id pool size: the full span of non-negative `i16`
/// values, `-1` being reserved for events.
pub const DEFAULT_STREAM_ID_POOL_SIZE: u16 = 32768;

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_frame_body_len: DEFAULT_MAX_FRAME_BODY_LEN,
            stream_id_pool_size: DEFAULT_STREAM_ID_POOL_SIZE,
        }
    }
}

/// Tunables for [`crate::session::Session::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The `CQL_VERSION` value sent in `STARTUP`.
    pub cql_version: String,
    /// The compression algorithm to request, if any. Must name an
    /// algorithm this build has a [`wirebolt_proto::Compressor`] for.
    pub compression: Option<String>,
    /// How long `connect` waits for the handshake to reach `Ready`
    /// before failing with `HandshakeTimeout`.
    pub handshake_timeout: Duration,
    /// Wire-level tunables for the underlying dispatcher.
    pub dispatcher: DispatcherConfig,
}

/// Default handshake timeout: 10 seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cql_version: "3.0.0".to_owned(),
            compression: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            dispatcher: DispatcherConfig::default(),
        }
    }
}
