//! Errors raised at the handoff boundary.
//!
//! Every variant is fatal for the affected connection. The Rust API surfaces
//! them as `Result`s so they can be tested; the `extern "C"` callbacks in
//! [`crate::ffi`] log them and abort, since the ABI has no error channel.

use std::io;
use thiserror::Error;

/// Failures of the connection registry, segment framing or callback surface.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// Connection number outside `[0, max_connections)`.
    #[error("connection {connection} out of range: registry holds {max} slots")]
    OutOfRange { connection: i32, max: usize },

    /// `supply`/`address` on a connection that was never initialized.
    #[error("connection {0} has not been initialized")]
    NotInitialized(i32),

    /// `init` called twice for the same connection number.
    #[error("connection {0} was already initialized")]
    AlreadyInitialized(i32),

    /// A second caller entered `supply` for a connection while another was in flight.
    #[error("connection {0} is in use by another caller; calls on one connection must be serialized")]
    Busy(i32),

    /// Encoded payload plus length prefix does not fit the segment. Nothing was written.
    #[error("frame needs {needed} bytes but segment capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// A length prefix read back from a segment claims more bytes than the segment holds.
    #[error("corrupt frame: prefix declares {length} payload bytes, segment capacity is {capacity}")]
    CorruptFrame { length: u32, capacity: usize },

    #[error("failed to allocate {size}-byte segment for connection {connection}: {source}")]
    Allocation {
        connection: i32,
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of the request codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encode attempted before the descriptor type was registered.
    #[error("no type registered with this codec context")]
    Unregistered,

    /// Registration attempted with a different tag than the one already held.
    #[error("codec already registered as {existing}, refusing {requested}")]
    Reregistered { existing: String, requested: String },

    /// Decoded envelope names a different type than the registered one.
    #[error("payload is tagged {found}, expected {expected}")]
    TagMismatch { expected: String, found: String },

    #[error("json codec failure: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while reading or validating [`crate::config::HandoffConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("segment capacity {capacity} is out of bounds: must be in [{min}, {max}]")]
    SegmentCapacity { capacity: usize, min: usize, max: usize },

    #[error("max connections {0} is out of bounds: must be in [1, i32::MAX]")]
    MaxConnections(usize),
}

pub type Result<T, E = HandoffError> = std::result::Result<T, E>;
