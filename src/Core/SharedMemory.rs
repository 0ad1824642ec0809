// Segment allocation backends.
// One fixed-size mapping per connection, zero-initialized, with a base
// address that stays put until the owner drops it. There is no release path
// besides drop: segments live as long as their connection slot.

use std::alloc::{self, Layout};
use std::fmt::{self, Debug};
use std::io;
use std::ptr::NonNull;
use std::str::FromStr;

/// A mapped region the producer writes and the native consumer reads in place.
pub trait SegmentBackend: Send + Sync + Debug {
    /// Get a pointer to the start of the region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the region in bytes
    fn size(&self) -> usize;

    /// Get the OS-level handle backing the region, if any
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// File descriptor that another process can map (memfd)
    Fd(i32),
    /// Anonymous shared mapping, reachable only through its address
    Anonymous,
    /// Plain heap block
    Heap,
}

/// Which backend new segments are allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentBackendKind {
    /// `mmap(MAP_SHARED | MAP_ANONYMOUS)`
    Anonymous,
    /// `memfd_create` + `mmap(MAP_SHARED)`, Linux only
    Memfd,
    /// Aligned, zeroed heap allocation
    Heap,
}

impl Default for SegmentBackendKind {
    fn default() -> Self {
        if cfg!(unix) {
            SegmentBackendKind::Anonymous
        } else {
            SegmentBackendKind::Heap
        }
    }
}

impl FromStr for SegmentBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" | "anon" | "mmap" => Ok(SegmentBackendKind::Anonymous),
            "memfd" => Ok(SegmentBackendKind::Memfd),
            "heap" => Ok(SegmentBackendKind::Heap),
            other => Err(format!(
                "unknown segment backend {other:?}, expected one of anonymous, memfd, heap"
            )),
        }
    }
}

impl fmt::Display for SegmentBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentBackendKind::Anonymous => "anonymous",
            SegmentBackendKind::Memfd => "memfd",
            SegmentBackendKind::Heap => "heap",
        };
        f.write_str(name)
    }
}

/// Allocate one segment of exactly `size` bytes.
///
/// # Arguments
/// * `kind` - Backend to allocate from
/// * `size` - Segment size in bytes, must be non-zero
/// * `label` - Debug name, used for the memfd name
pub fn allocate_segment(
    kind: SegmentBackendKind,
    size: usize,
    label: &str,
) -> io::Result<Box<dyn SegmentBackend>> {
    if size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "segment size must be non-zero",
        ));
    }
    match kind {
        SegmentBackendKind::Anonymous => create_anonymous(size),
        SegmentBackendKind::Memfd => create_memfd(size, label),
        SegmentBackendKind::Heap => Ok(Box::new(HeapSegment::create(size)?)),
    }
}

#[cfg(unix)]
fn create_anonymous(size: usize) -> io::Result<Box<dyn SegmentBackend>> {
    Ok(Box::new(AnonymousSegment::create(size)?))
}

#[cfg(not(unix))]
fn create_anonymous(_size: usize) -> io::Result<Box<dyn SegmentBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "anonymous shared mappings require unix",
    ))
}

#[cfg(target_os = "linux")]
fn create_memfd(size: usize, label: &str) -> io::Result<Box<dyn SegmentBackend>> {
    Ok(Box::new(MemfdSegment::create(size, label)?))
}

#[cfg(not(target_os = "linux"))]
fn create_memfd(_size: usize, _label: &str) -> io::Result<Box<dyn SegmentBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "memfd segments only supported on Linux",
    ))
}

#[cfg(unix)]
#[derive(Debug)]
pub struct AnonymousSegment {
    ptr: NonNull<u8>,
    size: usize,
}

#[cfg(unix)]
unsafe impl Send for AnonymousSegment {}
#[cfg(unix)]
unsafe impl Sync for AnonymousSegment {}

#[cfg(unix)]
impl AnonymousSegment {
    pub fn create(size: usize) -> io::Result<Self> {
        let ptr = unsafe { map_shared(size, -1)? };
        Ok(Self { ptr, size })
    }
}

#[cfg(unix)]
impl Drop for AnonymousSegment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(unix)]
impl SegmentBackend for AnonymousSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Anonymous
    }
}

/// `mmap` a read-write shared region; `fd == -1` maps anonymous memory.
#[cfg(unix)]
unsafe fn map_shared(size: usize, fd: i32) -> io::Result<NonNull<u8>> {
    let flags = if fd < 0 {
        libc::MAP_SHARED | libc::MAP_ANONYMOUS
    } else {
        libc::MAP_SHARED
    };
    let ptr = libc::mmap(
        std::ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        flags,
        fd,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct MemfdSegment {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
}

#[cfg(target_os = "linux")]
unsafe impl Send for MemfdSegment {}
#[cfg(target_os = "linux")]
unsafe impl Sync for MemfdSegment {}

#[cfg(target_os = "linux")]
impl MemfdSegment {
    /// Create an fd-backed segment. The fd can be passed to another process
    /// (e.g. over a unix socket or via `/proc/<pid>/fd/<fd>`) to map the same pages.
    pub fn create(size: usize, label: &str) -> io::Result<Self> {
        let c_name = std::ffi::CString::new(label).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("segment label {label:?} contains a NUL byte"),
            )
        })?;

        let fd = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // Set size
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let ptr = match unsafe { map_shared(size, fd) } {
            Ok(ptr) => ptr,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };

        Ok(Self { ptr, size, fd })
    }
}

#[cfg(target_os = "linux")]
impl Drop for MemfdSegment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SegmentBackend for MemfdSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

/// Cache-line aligned heap segment. Available everywhere.
#[derive(Debug)]
pub struct HeapSegment {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapSegment {}
unsafe impl Sync for HeapSegment {}

impl HeapSegment {
    const ALIGN: usize = 64;

    pub fn create(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "segment size must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(size, Self::ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {size}-byte heap segment"),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapSegment {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl SegmentBackend for HeapSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}
