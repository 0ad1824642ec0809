use crate::config::HandoffConfig;
use crate::error::{HandoffError, Result};
use crate::Core::SharedMemory::{allocate_segment, SegmentBackend};
use crate::Handoff::codec::{Codec, JsonCodec, REQUEST_TYPE_TAG};
use crate::Handoff::source::{default_source_factory, SourceFactory};
use crate::Handoff::supplier::Supplier;
use crate::Handoff::Frame::SegmentHandle;
use crate::Handoff::Structs::Request_Structs::RequestDescriptor;
use crossbeam_utils::CachePadded;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, trace};
mod debug;
mod getters;

// Non-blocking guard: a contended slot is a caller bug, never a wait.
use parking_lot::Mutex;

/// Everything provisioned for one connection number.
pub struct ConnectionSlot {
    connection_number: i32,
    /// Base of `segment`, cached so `address` never touches the supplier.
    base: NonNull<u8>,
    capacity: usize,
    segment: Box<dyn SegmentBackend>,
    supplier: Mutex<Supplier>,
}

// `base` points into `segment`, which the slot owns and never moves or frees
// before drop. Writes through it happen only under the `supplier` guard.
unsafe impl Send for ConnectionSlot {}
unsafe impl Sync for ConnectionSlot {}

/// Fixed-capacity, index-addressed table of connection slots.
///
/// Slots are created once by [`ConnectionRegistry::init`] and never reclaimed
/// while the registry lives. The process-wide registry in [`crate::ffi`] is
/// never dropped, so its segments stay valid for the life of the process.
///
/// Distinct connection numbers share no mutable state and can be driven fully
/// concurrently. Calls on the same connection number must be serialized by the
/// caller; overlapping `supply` calls are detected and fail with
/// [`HandoffError::Busy`].
pub struct ConnectionRegistry {
    config: HandoffConfig,
    slots: Box<[CachePadded<OnceLock<ConnectionSlot>>]>,
    initialized: AtomicUsize,
    source_factory: SourceFactory,
}

impl ConnectionRegistry {
    /// Create an empty registry with `config.max_connections()` slots.
    pub fn new(config: HandoffConfig) -> Result<Self> {
        config.validate()?;

        let slots = (0..config.max_connections())
            .map(|_| CachePadded::new(OnceLock::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(
            max_connections = config.max_connections(),
            segment_capacity = config.segment_capacity(),
            backend = %config.backend(),
            "connection registry created"
        );

        Ok(Self {
            config,
            slots,
            initialized: AtomicUsize::new(0),
            source_factory: default_source_factory(),
        })
    }

    /// Replace the factory that builds each connection's request source.
    /// Only affects connections initialized afterwards.
    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = factory;
        self
    }

    fn index(&self, connection_number: i32) -> Result<usize> {
        usize::try_from(connection_number)
            .ok()
            .filter(|&idx| idx < self.slots.len())
            .ok_or(HandoffError::OutOfRange {
                connection: connection_number,
                max: self.slots.len(),
            })
    }

    /// Provision the segment and warmed codec context for `connection_number`.
    ///
    /// Call exactly once per connection, before any `supply`/`address` on it.
    /// A second call fails with [`HandoffError::AlreadyInitialized`] and leaves
    /// the existing slot untouched.
    ///
    /// Initialization is deliberately expensive: the codec context runs its
    /// warm-up loop (`warmup_iterations` encodes) so the first served request
    /// does not pay first-call costs.
    pub fn init(&self, connection_number: i32) -> Result<SegmentHandle<'_>> {
        let idx = self.index(connection_number)?;
        let cell = &self.slots[idx];
        if cell.get().is_some() {
            return Err(HandoffError::AlreadyInitialized(connection_number));
        }

        let slot = self.provision(connection_number)?;
        cell.set(slot)
            .map_err(|_| HandoffError::AlreadyInitialized(connection_number))?;
        self.initialized.fetch_add(1, Ordering::Relaxed);

        cell.get()
            .map(ConnectionSlot::handle)
            .ok_or(HandoffError::NotInitialized(connection_number))
    }

    fn provision(&self, connection_number: i32) -> Result<ConnectionSlot> {
        let capacity = self.config.segment_capacity();
        let allocation_error = |source: io::Error| HandoffError::Allocation {
            connection: connection_number,
            size: capacity,
            source,
        };

        let segment = allocate_segment(
            self.config.backend(),
            capacity,
            &format!("handoff-conn-{connection_number}"),
        )
        .map_err(allocation_error)?;
        let base = NonNull::new(segment.as_ptr()).ok_or_else(|| {
            allocation_error(io::Error::new(io::ErrorKind::Other, "segment has a null base"))
        })?;

        let started = Instant::now();
        let mut codec = JsonCodec::with_capacity(capacity);
        codec.register(REQUEST_TYPE_TAG)?;
        codec.warm_up(self.config.warmup_iterations())?;
        let source = (self.source_factory)(connection_number);

        info!(
            connection = connection_number,
            capacity,
            address = base.as_ptr() as usize,
            warmup_iterations = self.config.warmup_iterations(),
            warmup_us = started.elapsed().as_micros() as u64,
            "connection initialized"
        );

        Ok(ConnectionSlot {
            connection_number,
            base,
            capacity: segment.size(),
            segment,
            supplier: Mutex::new(Supplier::new(connection_number, Box::new(codec), source)),
        })
    }

    /// Look up an initialized slot.
    pub fn get(&self, connection_number: i32) -> Result<&ConnectionSlot> {
        let idx = self.index(connection_number)?;
        self.slots[idx]
            .get()
            .ok_or(HandoffError::NotInitialized(connection_number))
    }

    /// Encode the connection's next request and frame it into its segment,
    /// overwriting the previous frame. Returns the frame size.
    ///
    /// Nothing is written if the frame would not fit.
    pub fn supply(&self, connection_number: i32) -> Result<usize> {
        let slot = self.get(connection_number)?;
        let mut supplier = slot
            .supplier
            .try_lock()
            .ok_or(HandoffError::Busy(connection_number))?;
        let written = supplier.supply(&slot.handle())?;
        trace!(connection = connection_number, bytes = written, "frame supplied");
        Ok(written)
    }

    /// Frame a caller-provided descriptor instead of the connection's source.
    pub fn supply_with(&self, connection_number: i32, request: &RequestDescriptor) -> Result<usize> {
        let slot = self.get(connection_number)?;
        let mut supplier = slot
            .supplier
            .try_lock()
            .ok_or(HandoffError::Busy(connection_number))?;
        let written = supplier.supply_with(&slot.handle(), request)?;
        trace!(connection = connection_number, bytes = written, "frame supplied");
        Ok(written)
    }

    /// Base address of the connection's segment, for the native side to
    /// reinterpret as a pointer.
    pub fn address(&self, connection_number: i32) -> Result<i64> {
        Ok(self.get(connection_number)?.handle().address())
    }

    /// Typed view of the connection's segment.
    pub fn segment(&self, connection_number: i32) -> Result<SegmentHandle<'_>> {
        Ok(self.get(connection_number)?.handle())
    }

    /// Decode whatever frame currently sits in the connection's segment.
    ///
    /// # Safety
    /// No `supply` may run on this connection concurrently.
    pub unsafe fn read_request(&self, connection_number: i32) -> Result<RequestDescriptor> {
        let slot = self.get(connection_number)?;
        let payload = slot.handle().payload()?;
        let mut codec = JsonCodec::new();
        codec.register(REQUEST_TYPE_TAG)?;
        Ok(codec.decode(payload)?)
    }
}
