//! # Durable Cart Store
//!
//! Bridges the synchronous [`vend_core::CartStore`] hook to async SQLite.
//! The cart ledger calls `persist` from inside its mutation path; blocking
//! there on disk I/O would stall scanning, so the write is spawned onto
//! the runtime and the mutation returns immediately.
//!
//! Writes for one store always overwrite the same row, so a lost
//! fire-and-forget write costs at most the delta since the previous
//! mutation, and the next mutation repairs it.

use tracing::warn;
use vend_core::{CartSnapshot, CartStore};

use crate::repository::cart::CartRepository;

/// `CartStore` implementation that persists snapshots to SQLite.
#[derive(Debug, Clone)]
pub struct SqliteCartStore {
    repo: CartRepository,
    store_id: String,
}

impl SqliteCartStore {
    pub fn new(repo: CartRepository, store_id: impl Into<String>) -> Self {
        SqliteCartStore {
            repo,
            store_id: store_id.into(),
        }
    }

    /// Awaitable write path, for shutdown flushes and tests.
    pub async fn persist_now(&self, snapshot: &CartSnapshot) {
        if let Err(err) = self.repo.save(&self.store_id, snapshot).await {
            warn!(store_id = %self.store_id, error = %err, "cart snapshot write failed");
        }
    }
}

impl CartStore for SqliteCartStore {
    fn persist(&self, snapshot: &CartSnapshot) {
        let store = self.clone();
        let snapshot = snapshot.clone();
        tokio::spawn(async move {
            store.persist_now(&snapshot).await;
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
