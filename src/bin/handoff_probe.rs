// Drives the published callbacks the way a native load-generation driver does:
// one thread per connection running init, then supply/address/read in a loop.
//
// Usage: handoff_probe <connections> <duration_secs> [--no-verify]

use loadgen_handoff::ffi::{handoff_bootstrap, handoff_segment_capacity, NativeCallbacks};
use loadgen_handoff::{Codec, HandoffError, JsonCodec, REQUEST_TYPE_TAG};
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy)]
struct ConnectionStats {
    frames: u64,
    bytes: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <connections> <duration_secs> [--no-verify]", args[0]);
        std::process::exit(1);
    }

    let connections: i32 = args[1]
        .parse()
        .map_err(|e| format!("invalid connection count {:?}: {e}", args[1]))?;
    let duration_secs: u64 = args[2]
        .parse()
        .map_err(|e| format!("invalid duration {:?}: {e}", args[2]))?;
    let verify = !args.iter().skip(3).any(|a| a == "--no-verify");
    if connections <= 0 {
        return Err("connection count must be positive".into());
    }

    loadgen_handoff::logging::init_tracing();

    let table = handoff_bootstrap();
    // SAFETY: bootstrap returns a pointer to a static table.
    let addresses = unsafe { (*table).addresses() };
    // SAFETY: the addresses were just published by this crate.
    let callbacks = unsafe { NativeCallbacks::from_addresses(addresses) }
        .ok_or("bootstrap published a null callback")?;
    let capacity = handoff_segment_capacity() as usize;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })?;

    info!(connections, duration_secs, capacity, verify, "probe starting");

    let duration = Duration::from_secs(duration_secs);
    let barrier = Arc::new(Barrier::new(connections as usize + 1));
    let mut workers = Vec::with_capacity(connections as usize);

    let init_started = Instant::now();
    for n in 0..connections {
        let barrier = Arc::clone(&barrier);
        let running = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name(format!("conn-{n}"))
            .spawn(move || {
                callbacks.init(n);
                barrier.wait();
                drive(callbacks, n, capacity, duration, &running, verify)
            })?;
        workers.push(worker);
    }

    barrier.wait();
    info!(
        elapsed_ms = init_started.elapsed().as_millis() as u64,
        "all connections initialized"
    );

    let started = Instant::now();
    let mut total = ConnectionStats::default();
    let mut failed = 0usize;
    for (n, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(Ok(stats)) => {
                total.frames += stats.frames;
                total.bytes += stats.bytes;
            }
            Ok(Err(e)) => {
                error!(connection = n, error = %e, "connection failed");
                failed += 1;
            }
            Err(_) => {
                error!(connection = n, "connection thread panicked");
                failed += 1;
            }
        }
    }
    let elapsed = started.elapsed();

    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!("Probe: {} connections, {:.2?}", connections, elapsed);
    println!("Probe: {} frames, {} bytes", total.frames, total.bytes);
    println!(
        "Probe: {:.0} frames/sec, {:.2} MB/sec, {} avg bytes/frame",
        total.frames as f64 / secs,
        total.bytes as f64 / secs / 1_000_000.0,
        total.bytes.checked_div(total.frames).unwrap_or(0)
    );
    info!(frames = total.frames, bytes = total.bytes, failed, "probe finished");

    if failed > 0 {
        return Err(format!("{failed} connections failed").into());
    }
    Ok(())
}

fn drive(
    callbacks: NativeCallbacks,
    connection_number: i32,
    capacity: usize,
    duration: Duration,
    running: &AtomicBool,
    verify: bool,
) -> Result<ConnectionStats, HandoffError> {
    let mut codec = JsonCodec::with_capacity(capacity);
    codec.register(REQUEST_TYPE_TAG)?;
    let mut stats = ConnectionStats::default();
    let deadline = Instant::now() + duration;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        callbacks.supply(connection_number);
        // SAFETY: capacity comes from the registry and this thread is the
        // connection's only caller.
        let segment = unsafe { callbacks.segment(connection_number, capacity) }
            .ok_or(HandoffError::NotInitialized(connection_number))?;
        let payload = unsafe { segment.payload()? };
        if verify {
            codec.decode(payload)?;
        }
        stats.frames += 1;
        stats.bytes += payload.len() as u64;
    }
    Ok(stats)
}
