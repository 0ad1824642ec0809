use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use super::layout::LENGTH_PREFIX_BYTES;
use super::Frame::SegmentHandle;
use crate::error::{HandoffError, Result};

impl<'a> SegmentHandle<'a> {
    /// Wrap a segment owned by the caller.
    pub(crate) fn new(base: NonNull<u8>, capacity: usize) -> Self {
        Self {
            base: base.as_ptr(),
            capacity: capacity as u64,
            _segment: PhantomData,
        }
    }

    /// Rebuild a handle from the integer returned by the address callback.
    ///
    /// Returns `None` for a zero address.
    ///
    /// # Safety
    /// `address` must be the base of a live segment of at least `capacity`
    /// bytes, and that segment must outlive `'a`.
    pub unsafe fn from_address(address: i64, capacity: usize) -> Option<Self> {
        NonNull::new(address as usize as *mut u8).map(|base| Self::new(base, capacity))
    }

    /// Base address as the integer the `address` callback returns.
    #[inline]
    pub fn address(&self) -> i64 {
        self.base as usize as i64
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    /// Total segment size in bytes, length prefix included.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Largest payload a frame in this segment can carry.
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.capacity().saturating_sub(LENGTH_PREFIX_BYTES)
    }

    /// Write `[len as u32 LE][payload]` at the start of the segment.
    ///
    /// The size check runs before any byte is written, so a payload that does
    /// not fit leaves the previous frame intact. Returns the frame size.
    ///
    /// # Safety
    /// The caller must be the only writer for this segment and no reader may
    /// hold a slice from [`SegmentHandle::payload`] while this runs.
    pub(crate) unsafe fn write_frame(&self, payload: &[u8]) -> Result<usize> {
        let needed = LENGTH_PREFIX_BYTES.saturating_add(payload.len());
        let capacity = self.capacity();
        if needed > capacity {
            return Err(HandoffError::BufferTooSmall { needed, capacity });
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| HandoffError::BufferTooSmall { needed, capacity })?;

        let prefix = len.to_le_bytes();
        ptr::copy_nonoverlapping(prefix.as_ptr(), self.base, LENGTH_PREFIX_BYTES);
        ptr::copy_nonoverlapping(
            payload.as_ptr(),
            self.base.add(LENGTH_PREFIX_BYTES),
            payload.len(),
        );
        Ok(needed)
    }

    /// Read the little-endian length prefix.
    ///
    /// # Safety
    /// No `supply` may be in flight for this segment's connection.
    pub unsafe fn length_prefix(&self) -> u32 {
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        ptr::copy_nonoverlapping(self.base as *const u8, prefix.as_mut_ptr(), LENGTH_PREFIX_BYTES);
        u32::from_le_bytes(prefix)
    }

    /// Borrow exactly the `len` payload bytes that follow the prefix.
    ///
    /// # Safety
    /// No `supply` may run for this segment's connection while the returned
    /// slice is alive.
    pub unsafe fn payload(&self) -> Result<&'a [u8]> {
        let length = self.length_prefix();
        if LENGTH_PREFIX_BYTES.saturating_add(length as usize) > self.capacity() {
            return Err(HandoffError::CorruptFrame {
                length,
                capacity: self.capacity(),
            });
        }
        Ok(std::slice::from_raw_parts(
            self.base.add(LENGTH_PREFIX_BYTES) as *const u8,
            length as usize,
        ))
    }
}

impl std::fmt::Debug for SegmentHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_segment_handle(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;
    use std::mem::{align_of, size_of};

    fn handle_over(buf: &mut [u8]) -> SegmentHandle<'_> {
        SegmentHandle::new(NonNull::new(buf.as_mut_ptr()).unwrap(), buf.len())
    }

    #[test]
    fn test_segment_handle_layout() {
        // Native callers read this as { void* base; uint64_t capacity; }.
        assert_eq!(offset_of!(SegmentHandle<'static>, base), 0);
        assert_eq!(offset_of!(SegmentHandle<'static>, capacity), size_of::<*mut u8>());
        assert_eq!(
            size_of::<SegmentHandle<'static>>(),
            size_of::<*mut u8>() + size_of::<u64>()
        );
        assert_eq!(
            align_of::<SegmentHandle<'static>>(),
            align_of::<u64>().max(align_of::<*mut u8>())
        );
    }

    #[test]
    fn test_write_then_read_frame() {
        let mut buf = vec![0u8; 64];
        let handle = handle_over(&mut buf);
        let written = unsafe { handle.write_frame(b"hello") }.unwrap();
        assert_eq!(written, 9);
        assert_eq!(unsafe { handle.length_prefix() }, 5);
        assert_eq!(unsafe { handle.payload() }.unwrap(), b"hello");
        assert_eq!(&buf[..9], &[5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        let mut buf = vec![0u8; 8];
        let handle = handle_over(&mut buf);
        assert_eq!(unsafe { handle.write_frame(b"abcd") }.unwrap(), 8);
        assert_eq!(unsafe { handle.payload() }.unwrap(), b"abcd");
    }

    #[test]
    fn test_oversized_payload_leaves_segment_untouched() {
        let mut buf = vec![0xAAu8; 8];
        let handle = handle_over(&mut buf);
        let err = unsafe { handle.write_frame(b"abcde") }.unwrap_err();
        match err {
            HandoffError::BufferTooSmall { needed, capacity } => {
                assert_eq!(needed, 9);
                assert_eq!(capacity, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(buf.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_shorter_frame_overwrites_prefix() {
        let mut buf = vec![0u8; 32];
        let handle = handle_over(&mut buf);
        unsafe {
            handle.write_frame(b"a longer payload").unwrap();
            handle.write_frame(b"tiny").unwrap();
            assert_eq!(handle.payload().unwrap(), b"tiny");
        }
    }

    #[test]
    fn test_corrupt_prefix_is_rejected() {
        let mut buf = vec![0u8; 16];
        buf[..4].copy_from_slice(&100u32.to_le_bytes());
        let handle = handle_over(&mut buf);
        assert!(matches!(
            unsafe { handle.payload() },
            Err(HandoffError::CorruptFrame { length: 100, capacity: 16 })
        ));
    }

    #[test]
    fn test_from_address_round_trip() {
        let mut buf = vec![0u8; 16];
        let handle = handle_over(&mut buf);
        let rebuilt = unsafe { SegmentHandle::from_address(handle.address(), handle.capacity()) }
            .expect("non-zero address");
        assert_eq!(rebuilt, handle);
        assert!(unsafe { SegmentHandle::from_address(0, 16) }.is_none());
    }
}
