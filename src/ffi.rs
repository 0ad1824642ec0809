// Callback surface for the native driver.
//
// The native side receives three function addresses and from then on talks
// to this crate only through them:
//
//   init(int32)            -> void     provision a connection
//   supply(int32)          -> void     write the next frame into its segment
//   address(int32)         -> int64    base address of its segment
//
// Only integers cross. No error channel exists, so every failure is logged
// and the process aborts before anything unwinds across the boundary.

use crate::config::HandoffConfig;
use crate::error::HandoffError;
use crate::Core::registry::ConnectionRegistry;
use crate::Handoff::Frame::SegmentHandle;
use lazy_static::lazy_static;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

/// `init(connection_number)`
pub type InitFn = extern "C" fn(i32);
/// `supply(connection_number)`
pub type SupplyFn = extern "C" fn(i32);
/// `address(connection_number) -> segment base`
pub type AddressFn = extern "C" fn(i32) -> i64;

lazy_static! {
    /// Process-wide registry, configured from the environment on first use.
    /// Never dropped: slots and segments live until the process exits.
    static ref REGISTRY: ConnectionRegistry = bootstrap_registry();
}

fn bootstrap_registry() -> ConnectionRegistry {
    match HandoffConfig::from_env()
        .map_err(HandoffError::from)
        .and_then(ConnectionRegistry::new)
    {
        Ok(registry) => registry,
        Err(err) => fatal("bootstrap", -1, &err),
    }
}

/// The registry behind the callbacks.
pub fn registry() -> &'static ConnectionRegistry {
    &REGISTRY
}

/// The three published entry points, laid out for native consumption.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackTable {
    pub init: InitFn,
    pub supply: SupplyFn,
    pub address: AddressFn,
}

/// The same entry points as plain integers, the form a foreign runtime stores.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackAddresses {
    pub init: i64,
    pub supply: i64,
    pub address: i64,
}

/// Stable for the life of the process.
pub static CALLBACKS: CallbackTable = CallbackTable {
    init: handoff_init_connection,
    supply: handoff_supply_request,
    address: handoff_segment_address,
};

impl CallbackTable {
    pub fn addresses(&self) -> CallbackAddresses {
        CallbackAddresses {
            init: self.init as usize as i64,
            supply: self.supply as usize as i64,
            address: self.address as usize as i64,
        }
    }
}

// -----------------------------------------------------------------------------
// Callbacks
// -----------------------------------------------------------------------------

/// Provision segment and codec context for a connection.
///
/// Must be called exactly once per connection number, before `supply` or
/// `address` on it. Runs the codec warm-up loop, so expect it to be slow.
///
/// # Arguments
/// * `connection_number` - Dense index in `[0, max_connections)`.
///
/// Aborts the process on an out-of-range or already-initialized connection,
/// or if allocation or codec setup fails.
#[no_mangle]
pub extern "C" fn handoff_init_connection(connection_number: i32) {
    guard("init", connection_number, || {
        REGISTRY.init(connection_number).map(|_| ())
    })
}

/// Write the connection's next request into its segment as
/// `[u32 LE length][payload]`.
///
/// # Arguments
/// * `connection_number` - An initialized connection.
///
/// Aborts the process if the connection is unknown, the encode fails, the
/// frame does not fit the segment, or another call is in flight on the same
/// connection.
#[no_mangle]
pub extern "C" fn handoff_supply_request(connection_number: i32) {
    guard("supply", connection_number, || {
        REGISTRY.supply(connection_number).map(|_| ())
    })
}

/// Base address of the connection's segment.
///
/// # Arguments
/// * `connection_number` - An initialized connection.
///
/// # Returns
/// * Non-zero address, stable for the life of the process.
///
/// Aborts the process if the connection is unknown.
#[no_mangle]
pub extern "C" fn handoff_segment_address(connection_number: i32) -> i64 {
    guard("address", connection_number, || REGISTRY.address(connection_number))
}

// -----------------------------------------------------------------------------
// Publication
// -----------------------------------------------------------------------------

/// Set up logging and the process-wide registry, then publish the callbacks.
///
/// # Returns
/// * Pointer to the static [`CallbackTable`]. Never null.
#[no_mangle]
pub extern "C" fn handoff_bootstrap() -> *const CallbackTable {
    guard("bootstrap", -1, || {
        crate::logging::init_tracing();
        lazy_static::initialize(&REGISTRY);
        let addresses = CALLBACKS.addresses();
        info!(
            init = addresses.init,
            supply = addresses.supply,
            address = addresses.address,
            max_connections = REGISTRY.max_connections(),
            segment_capacity = REGISTRY.segment_capacity(),
            "handoff callbacks published"
        );
        Ok(&CALLBACKS as *const CallbackTable)
    })
}

/// Address of the `init` callback.
#[no_mangle]
pub extern "C" fn handoff_callback_address_init() -> i64 {
    CALLBACKS.addresses().init
}

/// Address of the `supply` callback.
#[no_mangle]
pub extern "C" fn handoff_callback_address_supply() -> i64 {
    CALLBACKS.addresses().supply
}

/// Address of the `address` callback.
#[no_mangle]
pub extern "C" fn handoff_callback_address_segment() -> i64 {
    CALLBACKS.addresses().address
}

/// Configured per-connection segment capacity in bytes.
#[no_mangle]
pub extern "C" fn handoff_segment_capacity() -> i64 {
    guard("capacity", -1, || Ok(REGISTRY.segment_capacity() as i64))
}

// -----------------------------------------------------------------------------
// Failure handling
// -----------------------------------------------------------------------------

fn guard<T>(
    operation: &'static str,
    connection_number: i32,
    f: impl FnOnce() -> Result<T, HandoffError>,
) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => fatal(operation, connection_number, &err),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            fatal(operation, connection_number, &format_args!("panic: {message}"))
        }
    }
}

#[cold]
fn fatal(operation: &str, connection_number: i32, err: &dyn Display) -> ! {
    error!(
        operation,
        connection = connection_number,
        error = %err,
        "fatal handoff failure, aborting"
    );
    eprintln!("FFI Error: {operation} on connection {connection_number} failed: {err}");
    std::process::abort()
}

// -----------------------------------------------------------------------------
// Native-side binding
// -----------------------------------------------------------------------------

/// Typed view of the published callbacks, as a native caller holds them.
///
/// Rust drivers (the probe binary, tests) use this to exercise the exact
/// integer-address path a foreign caller takes.
#[derive(Debug, Clone, Copy)]
pub struct NativeCallbacks {
    init: InitFn,
    supply: SupplyFn,
    address: AddressFn,
}

impl NativeCallbacks {
    pub fn from_table(table: &CallbackTable) -> Self {
        Self {
            init: table.init,
            supply: table.supply,
            address: table.address,
        }
    }

    /// Rebuild function pointers from published integers.
    ///
    /// Returns `None` if any address is zero.
    ///
    /// # Safety
    /// Each non-zero address must point to a function with the matching
    /// signature that stays valid for the life of the returned value.
    pub unsafe fn from_addresses(addresses: CallbackAddresses) -> Option<Self> {
        Some(Self {
            init: void_fn_from_address(addresses.init)?,
            supply: void_fn_from_address(addresses.supply)?,
            address: i64_fn_from_address(addresses.address)?,
        })
    }

    pub fn init(&self, connection_number: i32) {
        (self.init)(connection_number)
    }

    pub fn supply(&self, connection_number: i32) {
        (self.supply)(connection_number)
    }

    pub fn address(&self, connection_number: i32) -> i64 {
        (self.address)(connection_number)
    }

    /// Rebuild the connection's segment handle from the `address` callback.
    ///
    /// # Safety
    /// `capacity` must not exceed the real segment size, and the segment
    /// must outlive every use of the handle.
    pub unsafe fn segment(&self, connection_number: i32, capacity: usize) -> Option<SegmentHandle<'static>> {
        SegmentHandle::from_address(self.address(connection_number), capacity)
    }
}

unsafe fn void_fn_from_address(address: i64) -> Option<extern "C" fn(i32)> {
    if address == 0 {
        None
    } else {
        Some(std::mem::transmute::<usize, extern "C" fn(i32)>(address as usize))
    }
}

unsafe fn i64_fn_from_address(address: i64) -> Option<extern "C" fn(i32) -> i64> {
    if address == 0 {
        None
    } else {
        Some(std::mem::transmute::<usize, extern "C" fn(i32) -> i64>(address as usize))
    }
}
