// Where a connection's next request comes from.

use std::sync::Arc;

use crate::Handoff::Structs::Request_Structs::{default_request, RequestDescriptor};

/// Supplies the descriptor a connection encodes on each `supply` call.
///
/// Sources hand out borrows so the hot path does not build a new descriptor
/// per call.
pub trait RequestSource: Send {
    fn next_request(&mut self) -> &RequestDescriptor;
}

/// Builds one source per connection at init time.
pub type SourceFactory = Arc<dyn Fn(i32) -> Box<dyn RequestSource> + Send + Sync>;

/// Always supplies the same descriptor.
#[derive(Debug, Clone)]
pub struct FixedRequest(RequestDescriptor);

impl FixedRequest {
    pub fn new(request: RequestDescriptor) -> Self {
        Self(request)
    }
}

impl RequestSource for FixedRequest {
    fn next_request(&mut self) -> &RequestDescriptor {
        &self.0
    }
}

/// Cycles through a fixed list of descriptors.
#[derive(Debug, Clone)]
pub struct RotatingRequests {
    requests: Vec<RequestDescriptor>,
    next: usize,
}

impl RotatingRequests {
    /// Returns `None` for an empty list.
    pub fn new(requests: Vec<RequestDescriptor>) -> Option<Self> {
        if requests.is_empty() {
            None
        } else {
            Some(Self { requests, next: 0 })
        }
    }
}

impl RequestSource for RotatingRequests {
    fn next_request(&mut self) -> &RequestDescriptor {
        let idx = self.next;
        self.next = (self.next + 1) % self.requests.len();
        &self.requests[idx]
    }
}

/// Factory that gives every connection a [`FixedRequest`] of [`default_request`].
pub fn default_source_factory() -> SourceFactory {
    let request = default_request();
    Arc::new(move |_connection: i32| -> Box<dyn RequestSource> {
        Box::new(FixedRequest::new(request.clone()))
    })
}
