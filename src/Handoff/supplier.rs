// Per-connection producer state.

use crate::error::Result;
use crate::Handoff::codec::Codec;
use crate::Handoff::source::RequestSource;
use crate::Handoff::Frame::SegmentHandle;
use crate::Handoff::Structs::Request_Structs::RequestDescriptor;

/// The mutable half of a connection slot: a warmed codec context and the
/// source of requests. Exactly one `Supplier` exists per connection and it is
/// only ever driven by that connection's single writer.
pub struct Supplier {
    connection_number: i32,
    codec: Box<dyn Codec>,
    source: Box<dyn RequestSource>,
    supplied: u64,
}

impl Supplier {
    pub(crate) fn new(
        connection_number: i32,
        codec: Box<dyn Codec>,
        source: Box<dyn RequestSource>,
    ) -> Self {
        Self {
            connection_number,
            codec,
            source,
            supplied: 0,
        }
    }

    /// Encode the source's next request and frame it into `segment`.
    /// Returns the frame size, length prefix included.
    pub(crate) fn supply(&mut self, segment: &SegmentHandle<'_>) -> Result<usize> {
        let request = self.source.next_request();
        let encoded = self.codec.encode(request)?;
        // SAFETY: the registry hands out one Supplier per segment and only
        // behind its slot guard, so this is the segment's sole writer.
        let written = unsafe { segment.write_frame(encoded)? };
        self.supplied += 1;
        Ok(written)
    }

    /// Like [`Supplier::supply`] with a caller-provided descriptor.
    pub(crate) fn supply_with(
        &mut self,
        segment: &SegmentHandle<'_>,
        request: &RequestDescriptor,
    ) -> Result<usize> {
        let encoded = self.codec.encode(request)?;
        // SAFETY: as in `supply`.
        let written = unsafe { segment.write_frame(encoded)? };
        self.supplied += 1;
        Ok(written)
    }

    pub fn connection_number(&self) -> i32 {
        self.connection_number
    }

    /// Frames successfully written so far.
    pub fn supplied(&self) -> u64 {
        self.supplied
    }

    pub fn codec(&self) -> &dyn Codec {
        &*self.codec
    }
}
