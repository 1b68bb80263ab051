//! # Stock Snapshot Cache
//!
//! Shared last-write-wins table of the most recent known stock per product.
//! Every product resolution refreshes it under all identifiers the product
//! is known by (id, barcode, the scanned value), so the cap engine sees the
//! freshest figure regardless of which identifier the next scan uses.
//!
//! Staleness is accepted by design: the cap is a best-effort courtesy, not
//! an inventory reservation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;
use vend_core::StockLookup;

/// Thread-safe stock snapshot table. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct StockCache {
    inner: Arc<Mutex<HashMap<String, i64>>>,
}

impl StockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest known stock under one identifier. Negative counts
    /// from upstream clamp to zero.
    pub fn set(&self, key: &str, stock: i64) {
        let stock = stock.max(0);
        trace!(key, stock, "stock cache update");
        self.inner
            .lock()
            .expect("stock cache mutex poisoned")
            .insert(key.to_string(), stock);
    }

    /// Drops one entry (product deleted upstream).
    pub fn forget(&self, key: &str) {
        self.inner
            .lock()
            .expect("stock cache mutex poisoned")
            .remove(key);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.inner
            .lock()
            .expect("stock cache mutex poisoned")
            .get(key)
            .copied()
    }
}

impl StockLookup for StockCache {
    fn available(&self, id: &str, barcode: Option<&str>) -> Option<i64> {
        let map = self.inner.lock().expect("stock cache mutex poisoned");
        map.get(id)
            .or_else(|| barcode.and_then(|b| map.get(b)))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let cache = StockCache::new();
        cache.set("p1", 5);
        cache.set("p1", 2);
        assert_eq!(cache.get("p1"), Some(2));
    }

    #[test]
    fn test_negative_stock_clamps_to_zero() {
        let cache = StockCache::new();
        cache.set("p1", -3);
        assert_eq!(cache.get("p1"), Some(0));
    }

    #[test]
    fn test_lookup_falls_back_to_barcode() {
        let cache = StockCache::new();
        cache.set("5449000000996", 7);

        assert_eq!(cache.available("p1", Some("5449000000996")), Some(7));
        assert_eq!(cache.available("p1", None), None);
    }

    #[test]
    fn test_id_takes_precedence_over_barcode() {
        let cache = StockCache::new();
        cache.set("p1", 3);
        cache.set("5449000000996", 9);

        assert_eq!(cache.available("p1", Some("5449000000996")), Some(3));
    }

    #[test]
    fn test_clones_share_state() {
        let cache = StockCache::new();
        let view = cache.clone();
        cache.set("p1", 4);
        assert_eq!(view.get("p1"), Some(4));

        view.forget("p1");
        assert_eq!(cache.get("p1"), None);
    }
}
