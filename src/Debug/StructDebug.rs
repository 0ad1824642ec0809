use crate::Core::registry::{ConnectionRegistry, ConnectionSlot};
use crate::Handoff::Frame::SegmentHandle;
use std::fmt;

/// Debug function for ConnectionRegistry
///
/// Shows sizing and occupancy; never walks the slot table.
pub fn debug_connection_registry(
    registry: &ConnectionRegistry,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.debug_struct("ConnectionRegistry")
        .field("max_connections", &registry.max_connections())
        .field("initialized", &registry.initialized_count())
        .field("segment_capacity", &registry.segment_capacity())
        .field("backend", &registry.config().backend())
        .finish_non_exhaustive()
}

/// Debug function for ConnectionSlot
///
/// Shows the segment location without dereferencing it and without taking
/// the supplier guard, so it is safe to call mid-supply.
pub fn debug_connection_slot(slot: &ConnectionSlot, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConnectionSlot")
        .field("connection_number", &slot.connection_number())
        .field("segment", &slot.handle())
        .field("raw_handle", &slot.raw_handle())
        .finish_non_exhaustive()
}

/// Debug function for SegmentHandle
pub fn debug_segment_handle(handle: &SegmentHandle<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SegmentHandle")
        .field("base", &format_args!("0x{:x}", handle.address()))
        .field("capacity", &handle.capacity())
        .finish()
}
