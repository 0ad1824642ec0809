// Segment layout shared by the producer and the native consumer.
//
//   offset 0              4                    4 + len          capacity
//          +--------------+--------------------+----------------+
//          | len: u32 LE  | encoded descriptor |   undefined    |
//          +--------------+--------------------+----------------+
//
// Readers take the 4-byte prefix first and then exactly `len` bytes. Nothing
// past `4 + len` may be interpreted.

/// Width of the little-endian length prefix at the start of every segment.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Default per-connection segment capacity in bytes.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 10240;

/// Default bound on connection numbers a registry can hold.
pub const MAX_CONNECTIONS: usize = 50_000;

/// Smallest segment that can carry a frame (an empty payload).
pub const MIN_SEGMENT_CAPACITY: usize = LENGTH_PREFIX_BYTES;

/// Largest segment whose payload length still fits the u32 prefix.
pub const MAX_SEGMENT_CAPACITY: usize = (u32::MAX as usize).saturating_add(LENGTH_PREFIX_BYTES);
