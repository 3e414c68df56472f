//! Crate error taxonomy.
//!
//! Transport and frame errors are local-recovery: the session logs them and
//! continues. Session-invalid and catalog errors are surfaced to the
//! caller, the former as a [`crate::Event::SessionFailure`] and the latter
//! by refusing to construct a [`crate::Session`].

use thiserror::Error;

/// Errors surfaced by the crate's public API.
#[derive(Debug, Error)]
pub enum Error {
    /// A read/write/subscribe/connect call on the adapter failed. Logged at
    /// warn and swallowed by the caller that issued it; does not change
    /// session state.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session-level invariant that a connection yields a usable key
    /// and catalog entry was violated (empty manufacturer data, or an
    /// article number absent from the catalog).
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    /// A frame failed to decode to a plausible shape (odd-length hex
    /// string, status frame whose key echo did not match). The frame is
    /// dropped, not fatal.
    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    /// No peripheral matched the scan predicate before it was cancelled.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    /// The machine or per-model catalog could not be loaded. Fatal at
    /// process start.
    #[error("catalog error: {0}")]
    Catalog(String),
}
