//! Client library for the proprietary BlueFrog BLE GATT protocol spoken by
//! a family of consumer coffee machines.
//!
//! Discovers a machine by advertised name, connects over GATT, decodes the
//! manufacturer advertisement to derive the per-session obfuscation key,
//! and drives the machine through its command/response protocol: identity
//! and firmware queries, alert and product-progress reads, product-start
//! and power-mode writes, statistics requests, and a periodic heartbeat
//! that keeps the peripheral from going idle.
//!
//! The BLE transport itself, the machine/product/alert catalogs, and the
//! driving program are external collaborators — see [`adapter::Adapter`]
//! and [`catalog`].

#![warn(missing_debug_implementations)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use bluefrog_codec::enc_dec;

pub mod adapter;
pub mod catalog;
pub mod commands;
pub mod error;
pub mod events;
pub mod hex;
pub mod session;
pub mod uuid;
pub mod wire;

pub use error::Error;
pub use events::Event;
pub use session::{Session, SessionState};

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

type SyncMutex<T> = parking_lot::Mutex<T>;
