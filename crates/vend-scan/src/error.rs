//! # Lookup Failure Taxonomy
//!
//! Product resolution crosses a host boundary (local DB, remote API, or
//! both). The dispatcher only needs to distinguish the failures it reacts
//! to differently; everything else collapses into `Backend`.

use thiserror::Error;

/// Why a product lookup failed.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Transport-level failure reaching the backend.
    #[error("network error during product lookup: {0}")]
    Network(String),

    /// The device's credentials were rejected. Routed to a dedicated host
    /// hook so the UI can start re-registration instead of showing a
    /// generic toast.
    #[error("device authentication rejected: {0}")]
    DeviceAuth(String),

    /// The backend reports this store as deactivated. The dispatcher flips
    /// its own store-active gate so later scans fail fast locally.
    #[error("store is not active")]
    StoreInactive,

    /// Any other backend-reported failure.
    #[error("product lookup failed: {0}")]
    Backend(String),
}
