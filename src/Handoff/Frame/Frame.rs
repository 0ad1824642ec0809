// The boundary type for a connection's segment.

use std::marker::PhantomData;

/// A tagged view of one connection's segment: base pointer plus capacity.
///
/// This is what crosses the boundary inside Rust instead of a bare integer.
/// The integer-only ABI still hands the native side [`SegmentHandle::address`],
/// and the native side can rebuild a handle with
/// [`SegmentHandle::from_address`] once it knows the configured capacity.
///
/// The lifetime ties the handle to the registry that owns the segment. For the
/// process-wide registry it is `'static`: segments are never reclaimed.
///
/// `#[repr(C)]` so the pair can be passed by value to native code.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SegmentHandle<'a> {
    /// Stable base address of the segment.
    pub(crate) base: *mut u8,

    /// Segment size in bytes, length prefix included.
    pub(crate) capacity: u64,

    pub(crate) _segment: PhantomData<&'a [u8]>,
}

// The handle is only an address; reads and writes through it are gated by
// `unsafe` methods whose contracts encode the single-writer rule.
unsafe impl Send for SegmentHandle<'_> {}
unsafe impl Sync for SegmentHandle<'_> {}
