//! The BLE transport boundary.
//!
//! [`Adapter`] is the narrow, synchronous capability surface the session
//! needs: scan, connect, read, write, subscribe, disconnect, and the
//! manufacturer-data accessor. All operations may fail transiently; the
//! session logs and continues except where documented otherwise.

use std::fmt::Debug;
use std::time::Duration;

use regex::Regex;

use crate::uuid::Uuid;

/// An opaque handle to a connected peripheral, owned exclusively by the
/// [`crate::Session`] that created it.
pub trait Handle: Debug + Send + Sync {
    /// Drains adapter events (notifications, an unsolicited disconnect)
    /// queued for this handle since the last call. Never blocks.
    fn poll_events(&self) -> Vec<AdapterEvent>;
}

/// Notification or disconnect callback payload delivered on the adapter's
/// own thread(s). Callbacks MUST be non-blocking and MUST NOT re-enter the
/// session's connect/disconnect entry points synchronously.
#[derive(Debug)]
pub enum AdapterEvent {
    /// A subscribed characteristic produced new data.
    Notification { uuid: Uuid, data: Vec<u8> },
    /// The peripheral disconnected without a local `disconnect()` call.
    Disconnected,
}

/// The BLE transport capability the core protocol layer depends on.
/// Implementations may fail any single call; failures are transport-transient
/// unless documented otherwise.
pub trait Adapter: Send + Sync {
    /// A device handle produced by [`Adapter::connect`].
    type Handle: Handle;

    /// Enumerates advertising peripherals, returning the first
    /// `(name, address)` whose name matches `name_pattern`, or `None` if
    /// `cancel` fires first.
    fn scan(
        &self,
        name_pattern: &Regex,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> crate::Result<Option<(String, String)>>;

    /// Establishes a legacy GATT connection to `address`.
    fn connect(&self, address: &str) -> crate::Result<Self::Handle>;

    /// Synchronous characteristic read.
    fn read_characteristic(&self, handle: &Self::Handle, uuid: Uuid) -> crate::Result<Vec<u8>>;

    /// Synchronous write-without-response.
    fn write_characteristic(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
        data: &[u8],
    ) -> crate::Result<()>;

    /// Subscribes to notifications on `uuid`; subsequent values arrive
    /// through whatever callback mechanism the implementation wires to
    /// [`AdapterEvent::Notification`].
    fn subscribe(&self, handle: &Self::Handle, uuid: Uuid) -> crate::Result<()>;

    /// Returns the manufacturer-specific field of the connected
    /// peripheral's advertisement.
    fn manufacturer_data(&self, handle: &Self::Handle) -> Vec<u8>;

    /// Tears down the connection. Any subsequent disconnect callback for
    /// this handle is a no-op from the caller's perspective.
    fn disconnect(&self, handle: &Self::Handle);
}

/// Default poll interval the scan loop uses between cancellation checks.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[cfg(any(test, feature = "testing"))]
pub mod simulated;

pub mod btleplug_adapter;
