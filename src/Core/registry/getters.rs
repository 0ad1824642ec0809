use super::*;
use crate::Core::SharedMemory::RawHandle;

/// Accessors for a provisioned slot, used by the registry and for monitoring.
impl ConnectionSlot {
    pub fn connection_number(&self) -> i32 {
        self.connection_number
    }

    /// Typed view of this slot's segment, valid while the slot lives.
    pub fn handle(&self) -> SegmentHandle<'_> {
        SegmentHandle::new(self.base, self.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// OS handle behind the segment (an fd for memfd segments).
    pub fn raw_handle(&self) -> RawHandle {
        self.segment.raw_handle()
    }

    /// Frames written so far.
    ///
    /// Takes the supplier guard, so do not call this from inside a `supply`.
    pub fn supplied(&self) -> u64 {
        self.supplier.lock().supplied()
    }
}

impl ConnectionRegistry {
    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    pub fn max_connections(&self) -> usize {
        self.slots.len()
    }

    pub fn segment_capacity(&self) -> usize {
        self.config.segment_capacity()
    }

    /// Number of connections that completed `init`.
    ///
    /// Loaded with relaxed ordering; intended for monitoring.
    pub fn initialized_count(&self) -> usize {
        self.initialized.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self, connection_number: i32) -> bool {
        self.get(connection_number).is_ok()
    }
}
