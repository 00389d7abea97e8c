//! Dispatcher and session layer for the native protocol v4: owns a single
//! duplex transport, multiplexes in-flight requests over stream ids, and
//! exposes the `Session` coordinator callers actually drive a connection
//! through.
//!
//! This crate knows nothing about wire-format bytes directly; it drives
//! `wirebolt_proto`'s codec over a real transport and layers connection
//! lifecycle, request/response correlation, and prepared-statement caching
//! on top.

mod config;
mod dispatcher;
mod error;
mod session;
mod stream_id;

pub use config::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_FRAME_BODY_LEN, DEFAULT_STREAM_ID_POOL_SIZE,
    DispatcherConfig, SessionConfig,
};
pub use dispatcher::{ConnectionState, Dispatcher};
pub use error::DriverError;
pub use session::{PreparedHandle, Session};
pub use stream_id::StreamIdPool;
