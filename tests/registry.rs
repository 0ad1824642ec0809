// Connection registry integration tests
// Run with: cargo test --test registry -- --nocapture

use loadgen_handoff::Core::SegmentBackendKind;
use loadgen_handoff::Handoff::Structs::Request_Structs::{default_request, warmup_request};
use loadgen_handoff::{
    Codec, ConnectionRegistry, HandoffConfig, HandoffError, JsonCodec, RequestDescriptor,
    RequestSource, RotatingRequests, SourceFactory, REQUEST_TYPE_TAG,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn registry(max_connections: usize, capacity: usize) -> ConnectionRegistry {
    ConnectionRegistry::new(
        HandoffConfig::new()
            .with_max_connections(max_connections)
            .with_segment_capacity(capacity)
            .with_warmup_iterations(10),
    )
    .unwrap()
}

fn encoded_len(request: &RequestDescriptor) -> usize {
    let mut codec = JsonCodec::new();
    codec.register(REQUEST_TYPE_TAG).unwrap();
    codec.encode(request).unwrap().len()
}

fn random_request(rng: &mut fastrand::Rng, tag: usize) -> RequestDescriptor {
    let mut builder = RequestDescriptor::builder(
        format!("req-{tag}"),
        format!("https://host-{}.test/p/{}", rng.u16(..), rng.u32(..)),
    )
    .host(format!("host-{}.test", rng.u8(..)))
    .port(rng.i32(1..65_536))
    .method(["GET", "POST", "PUT", "DELETE"][rng.usize(..4)])
    .path(format!("/p/{}", rng.u32(..)))
    .valid_status_codes((0..rng.usize(0..4)).map(|_| rng.i32(100..600)))
    .insecure(rng.bool());
    if rng.bool() {
        builder = builder.max_response_time_sla_micros(rng.u64(..1_000_000));
    }
    for i in 0..rng.usize(0..4) {
        builder = builder.header(format!("x-h{i}"), rng.u32(..).to_string());
    }
    for i in 0..rng.usize(0..3) {
        builder = builder.query_param(format!("q{i}"), rng.u16(..).to_string());
    }
    if rng.bool() {
        builder = builder.body("x".repeat(rng.usize(0..512)));
    }
    builder.build()
}

#[test]
fn test_address_is_non_zero_and_stable() {
    let registry = registry(4, 10240);
    let handle = registry.init(2).unwrap();
    let address = registry.address(2).unwrap();

    assert_ne!(address, 0);
    assert_eq!(handle.address(), address);
    for _ in 0..10 {
        registry.supply(2).unwrap();
        assert_eq!(registry.address(2).unwrap(), address);
    }
    assert_eq!(registry.initialized_count(), 1);
    assert!(registry.is_initialized(2));
    assert!(!registry.is_initialized(1));
}

#[test]
fn test_supplied_frame_decodes_to_source_request() {
    let registry = registry(2, 10240);
    registry.init(0).unwrap();
    registry.supply(0).unwrap();

    let decoded = unsafe { registry.read_request(0) }.unwrap();
    assert_eq!(decoded, default_request());
}

#[test]
fn test_length_prefix_matches_encoded_size() {
    let registry = registry(1, 10240);
    let handle = registry.init(0).unwrap();
    let written = registry.supply(0).unwrap();
    let expected = encoded_len(&default_request());

    unsafe {
        assert_eq!(handle.length_prefix() as usize, expected);
        assert_eq!(handle.payload().unwrap().len(), expected);
        // Raw little-endian read, the way a native consumer sees it
        let raw = std::slice::from_raw_parts(handle.as_ptr(), 4);
        assert_eq!(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize, expected);
    }
    assert_eq!(written, 4 + expected);
}

#[test]
fn test_oversized_frame_is_rejected_without_writing() {
    let registry = registry(1, 8);
    let handle = registry.init(0).unwrap();

    let err = registry.supply(0).unwrap_err();
    match err {
        HandoffError::BufferTooSmall { needed, capacity } => {
            assert_eq!(capacity, 8);
            assert_eq!(needed, 4 + encoded_len(&default_request()));
        }
        other => panic!("expected BufferTooSmall, got {other:?}"),
    }

    let bytes = unsafe { std::slice::from_raw_parts(handle.as_ptr(), handle.capacity()) };
    assert!(bytes.iter().all(|&b| b == 0), "segment was partially written");
    assert_eq!(registry.get(0).unwrap().supplied(), 0);
}

#[test]
fn test_oversized_frame_keeps_previous_frame() {
    let registry = registry(1, 512);
    registry.init(0).unwrap();

    let small = RequestDescriptor::builder("small", "http://s/").build();
    let big = RequestDescriptor::builder("big", "http://b/").body("y".repeat(1024)).build();

    registry.supply_with(0, &small).unwrap();
    assert!(matches!(
        registry.supply_with(0, &big),
        Err(HandoffError::BufferTooSmall { capacity: 512, .. })
    ));
    assert_eq!(unsafe { registry.read_request(0) }.unwrap(), small);
}

#[test]
fn test_supply_overwrites_previous_frame() {
    let registry = registry(1, 10240);
    registry.init(0).unwrap();

    let long = RequestDescriptor::builder("long", "http://l/").body("z".repeat(2048)).build();
    let short = RequestDescriptor::builder("short", "http://s/").build();

    registry.supply_with(0, &long).unwrap();
    registry.supply_with(0, &short).unwrap();
    assert_eq!(unsafe { registry.read_request(0) }.unwrap(), short);
    assert_eq!(registry.get(0).unwrap().supplied(), 2);
}

#[test]
fn test_concurrent_connections_are_isolated() {
    const CONNECTIONS: usize = 8;
    const ROUNDS: usize = 200;

    let registry = registry(CONNECTIONS, 4096);
    let barrier = Barrier::new(CONNECTIONS);

    let addresses: Vec<i64> = thread::scope(|s| {
        let handles: Vec<_> = (0..CONNECTIONS as i32)
            .map(|n| {
                let registry = &registry;
                let barrier = &barrier;
                s.spawn(move || {
                    registry.init(n).unwrap();
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let request = RequestDescriptor::builder(
                            format!("conn-{n}-round-{round}"),
                            format!("http://conn-{n}/"),
                        )
                        .port(n)
                        .build();
                        registry.supply_with(n, &request).unwrap();
                        let decoded = unsafe { registry.read_request(n) }.unwrap();
                        assert_eq!(decoded, request, "connection {n} saw foreign content");
                    }
                    registry.address(n).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, a) in addresses.iter().enumerate() {
        for b in &addresses[i + 1..] {
            assert!((a - b).unsigned_abs() >= 4096, "segments overlap");
        }
    }
    assert_eq!(registry.initialized_count(), CONNECTIONS);
}

#[test]
fn test_encoding_is_deterministic() {
    let registry = registry(2, 10240);
    let a = registry.init(0).unwrap();
    let b = registry.init(1).unwrap();

    registry.supply(0).unwrap();
    registry.supply(1).unwrap();
    let first = unsafe { a.payload().unwrap().to_vec() };
    assert_eq!(first, unsafe { b.payload().unwrap() });

    registry.supply(0).unwrap();
    assert_eq!(first, unsafe { a.payload().unwrap() });
}

#[test]
fn test_uninitialized_connection_is_an_error() {
    let registry = registry(4, 10240);

    assert!(matches!(registry.supply(1), Err(HandoffError::NotInitialized(1))));
    assert!(matches!(registry.address(1), Err(HandoffError::NotInitialized(1))));
    assert!(matches!(registry.segment(3), Err(HandoffError::NotInitialized(3))));
    assert!(matches!(
        registry.supply(4),
        Err(HandoffError::OutOfRange { connection: 4, max: 4 })
    ));
    assert!(matches!(
        registry.init(-1),
        Err(HandoffError::OutOfRange { connection: -1, .. })
    ));
    assert_eq!(registry.initialized_count(), 0);
}

#[test]
fn test_double_init_is_rejected() {
    let registry = registry(2, 10240);
    registry.init(0).unwrap();
    registry.supply(0).unwrap();
    let address = registry.address(0).unwrap();

    assert!(matches!(registry.init(0), Err(HandoffError::AlreadyInitialized(0))));
    assert_eq!(registry.address(0).unwrap(), address);
    assert_eq!(unsafe { registry.read_request(0) }.unwrap(), default_request());
    assert_eq!(registry.initialized_count(), 1);
}

/// Source that parks inside `next_request` until released.
struct GatedSource {
    request: RequestDescriptor,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl RequestSource for GatedSource {
    fn next_request(&mut self) -> &RequestDescriptor {
        self.entered.wait();
        self.release.wait();
        &self.request
    }
}

#[test]
fn test_overlapping_supply_on_one_connection_is_busy() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let factory: SourceFactory = {
        let (entered, release) = (entered.clone(), release.clone());
        Arc::new(move |_: i32| -> Box<dyn RequestSource> {
            Box::new(GatedSource {
                request: default_request(),
                entered: entered.clone(),
                release: release.clone(),
            })
        })
    };
    let registry = registry(1, 10240).with_source_factory(factory);
    registry.init(0).unwrap();

    thread::scope(|s| {
        let in_flight = s.spawn(|| registry.supply(0));
        entered.wait();
        assert!(matches!(registry.supply(0), Err(HandoffError::Busy(0))));
        // address never takes the supplier guard
        assert!(registry.address(0).is_ok());
        release.wait();
        assert!(in_flight.join().unwrap().is_ok());
    });
}

#[test]
fn test_rotating_source_factory() {
    let requests: Vec<RequestDescriptor> = ["a", "b", "c"]
        .iter()
        .map(|l| RequestDescriptor::builder(*l, format!("http://{l}/")).build())
        .collect();
    let factory: SourceFactory = {
        let requests = requests.clone();
        Arc::new(move |_: i32| -> Box<dyn RequestSource> {
            Box::new(RotatingRequests::new(requests.clone()).unwrap())
        })
    };
    let registry = registry(2, 10240).with_source_factory(factory);
    registry.init(0).unwrap();
    registry.init(1).unwrap();

    for expected in requests.iter().cycle().take(7) {
        registry.supply(0).unwrap();
        assert_eq!(&unsafe { registry.read_request(0) }.unwrap(), expected);
    }
    // each connection owns its own cursor
    registry.supply(1).unwrap();
    assert_eq!(unsafe { registry.read_request(1) }.unwrap(), requests[0]);
}

#[test]
fn test_randomized_requests_round_trip() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let registry = registry(1, 10240);
    registry.init(0).unwrap();

    for i in 0..500 {
        let request = random_request(&mut rng, i);
        let written = registry.supply_with(0, &request).unwrap();
        assert_eq!(written, 4 + encoded_len(&request));
        assert_eq!(unsafe { registry.read_request(0) }.unwrap(), request);
    }
}

#[test]
fn test_warmup_request_fits_default_segment() {
    let registry = registry(1, 10240);
    registry.init(0).unwrap();
    registry.supply_with(0, &warmup_request()).unwrap();
    assert_eq!(unsafe { registry.read_request(0) }.unwrap(), warmup_request());
}

#[test]
fn test_every_backend_serves_frames() {
    let mut kinds = vec![SegmentBackendKind::Heap];
    if cfg!(unix) {
        kinds.push(SegmentBackendKind::Anonymous);
    }
    if cfg!(target_os = "linux") {
        kinds.push(SegmentBackendKind::Memfd);
    }

    for kind in kinds {
        let registry = ConnectionRegistry::new(
            HandoffConfig::new()
                .with_max_connections(1)
                .with_backend(kind)
                .with_warmup_iterations(0),
        )
        .unwrap();
        registry.init(0).unwrap();
        registry.supply(0).unwrap();
        assert_eq!(
            unsafe { registry.read_request(0) }.unwrap(),
            default_request(),
            "{kind} backend"
        );
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = ConnectionRegistry::new(HandoffConfig::new().with_segment_capacity(2)).unwrap_err();
    assert!(matches!(err, HandoffError::Config(_)));
}
