// Module naming follows project convention (PascalCase component groups)
#[allow(non_snake_case)]
pub mod Handoff {
    pub mod Frame {
        #[allow(clippy::module_inception)]
        pub mod Frame;
        pub mod Frame_impl;
        pub mod layout;
        pub use Frame::SegmentHandle; // re-export for stable path
    }
    pub mod Structs {
        pub mod Request_Structs;
        pub use Request_Structs::{RequestBuilder, RequestDescriptor}; // re-export for stable path
    }
    pub mod codec;
    pub mod source;
    pub mod supplier;
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{allocate_segment, RawHandle, SegmentBackend, SegmentBackendKind};
    pub mod registry;
}
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;
pub mod ffi;
pub mod logging;

pub use config::HandoffConfig;
pub use error::{CodecError, ConfigError, HandoffError};
pub use Core::registry::{ConnectionRegistry, ConnectionSlot};
pub use Handoff::codec::{Codec, JsonCodec, TypeTag, REQUEST_TYPE_TAG};
pub use Handoff::source::{FixedRequest, RequestSource, RotatingRequests, SourceFactory};
pub use Handoff::Frame::SegmentHandle;
pub use Handoff::Structs::RequestDescriptor;
