//! # Error Types
//!
//! Domain error types for vend-core.
//!
//! Deliberately small: the ledger's expected conditions (locked, capped,
//! unknown line) are policy no-ops or [`crate::stock::StockLimitEvent`]s,
//! never errors. What remains is genuine data corruption at the
//! persistence seam.

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persisted cart snapshot failed to encode or decode.
    ///
    /// Surfaced at the storage seam; the host treats a corrupt snapshot as
    /// an empty cart rather than blocking startup.
    #[error("cart snapshot codec error: {0}")]
    SnapshotCodec(#[from] serde_json::Error),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
