//! Process-wide handoff settings.
//!
//! Read once at startup. Segment capacity applies to every connection; there
//! is no per-connection override.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::Core::SharedMemory::SegmentBackendKind;
use crate::Handoff::Frame::layout::{
    DEFAULT_SEGMENT_CAPACITY, MAX_CONNECTIONS, MAX_SEGMENT_CAPACITY, MIN_SEGMENT_CAPACITY,
};

/// Segment capacity in bytes for every connection.
pub const SEGMENT_SIZE_ENV: &str = "SEGMENT_SIZE_IN_BYTES";
/// `anonymous`, `memfd` or `heap`.
pub const SEGMENT_BACKEND_ENV: &str = "SEGMENT_BACKEND";
/// Encodes run per connection at init before serving.
pub const CODEC_WARMUP_ENV: &str = "CODEC_WARMUP_ITERATIONS";

pub const DEFAULT_WARMUP_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffConfig {
    segment_capacity: usize,
    max_connections: usize,
    backend: SegmentBackendKind,
    warmup_iterations: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            max_connections: MAX_CONNECTIONS,
            backend: SegmentBackendKind::default(),
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
        }
    }
}

impl HandoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(SEGMENT_SIZE_ENV) {
            config.segment_capacity = parse(SEGMENT_SIZE_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SEGMENT_BACKEND_ENV) {
            config.backend = parse(SEGMENT_BACKEND_ENV, &raw)?;
        }
        if let Some(raw) = lookup(CODEC_WARMUP_ENV) {
            config.warmup_iterations = parse(CODEC_WARMUP_ENV, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_segment_capacity(mut self, bytes: usize) -> Self {
        self.segment_capacity = bytes;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_backend(mut self, backend: SegmentBackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_warmup_iterations(mut self, iterations: usize) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SEGMENT_CAPACITY..=MAX_SEGMENT_CAPACITY).contains(&self.segment_capacity) {
            return Err(ConfigError::SegmentCapacity {
                capacity: self.segment_capacity,
                min: MIN_SEGMENT_CAPACITY,
                max: MAX_SEGMENT_CAPACITY,
            });
        }
        if self.max_connections == 0 || self.max_connections > i32::MAX as usize {
            return Err(ConfigError::MaxConnections(self.max_connections));
        }
        Ok(())
    }

    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn backend(&self) -> SegmentBackendKind {
        self.backend
    }

    pub fn warmup_iterations(&self) -> usize {
        self.warmup_iterations
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
