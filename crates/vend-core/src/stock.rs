//! # Stock Cap Engine
//!
//! Pure functions clamping requested cart quantities against known inventory.
//!
//! ## The Two Intents
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cap_add_quantity        "add N more to what's already in the cart"     │
//! │                          (scan paths, + button)                         │
//! │                                                                         │
//! │  cap_requested_quantity  "set the quantity to exactly N"                │
//! │                          (quantity edits, undo/rehydrate normalization) │
//! │                                                                         │
//! │  Both are total: every input combination yields a CapResult whose       │
//! │  next_qty the ledger may apply without further clamping.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unknown Stock Policy
//! `available_stock == None` means "not yet fetched", and an unverified
//! stock figure must never allow overselling. So adds are blocked outright
//! while decreases always go through. This is a deliberate conservative
//! policy; do not relax it to allow provisional increases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CapResult
// =============================================================================

/// Outcome of a capping operation.
///
/// Invariant: `next_qty` is always a valid, non-negative quantity the cart
/// ledger can apply as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapResult {
    /// The quantity the line should end up at.
    pub next_qty: i64,

    /// How much of the requested add actually went through (add-mode only;
    /// zero in set-mode).
    pub added_qty: i64,

    /// The request was reduced to fit available stock.
    pub capped: bool,

    /// Known stock is zero or less.
    pub out_of_stock: bool,

    /// Stock was unknown and the request would have increased quantity.
    pub unknown_stock: bool,
}

// =============================================================================
// Cap Functions
// =============================================================================

/// Caps "add `requested_add_qty` more" against available stock.
///
/// ## Rules
/// - `available_stock == None`: no increase permitted. `next_qty` stays at
///   `current_qty`, `added_qty` is 0, `unknown_stock` is set.
/// - Otherwise `next_qty = min(current + add, max(stock, 0))`,
///   `added_qty = next_qty - current`, `out_of_stock = stock <= 0`,
///   `capped = next_qty < current + add`.
///
/// ## Example
/// ```rust
/// use vend_core::stock::cap_add_quantity;
///
/// let r = cap_add_quantity(2, 2, Some(3));
/// assert_eq!((r.next_qty, r.added_qty, r.capped), (3, 1, true));
/// ```
pub fn cap_add_quantity(
    current_qty: i64,
    requested_add_qty: i64,
    available_stock: Option<i64>,
) -> CapResult {
    let current = current_qty.max(0);
    // Add-mode never decreases; negative adds are treated as zero.
    let add = requested_add_qty.max(0);

    match available_stock {
        None => CapResult {
            next_qty: current,
            added_qty: 0,
            capped: add > 0,
            out_of_stock: false,
            unknown_stock: true,
        },
        Some(stock) => {
            let ceiling = stock.max(0);
            // A line already above a shrunken ceiling is not reduced here;
            // add-mode only refuses the increase. Set-mode handles reductions.
            let next = (current + add).min(ceiling).max(current);
            CapResult {
                next_qty: next,
                added_qty: next - current,
                capped: next < current + add,
                out_of_stock: stock <= 0,
                unknown_stock: false,
            }
        }
    }
}

/// Caps "set the quantity to exactly `requested_qty`" against available
/// stock.
///
/// ## Rules
/// - `available_stock == None`: decreases always permitted, increases never.
///   `unknown_stock` is set only when the request would have increased the
///   quantity.
/// - Otherwise `next_qty = min(max(requested, 0), max(stock, 0))`,
///   `out_of_stock = stock <= 0`, `capped = next_qty < requested`.
pub fn cap_requested_quantity(
    current_qty: i64,
    requested_qty: i64,
    available_stock: Option<i64>,
) -> CapResult {
    let current = current_qty.max(0);

    match available_stock {
        None => {
            let next = if requested_qty < current {
                requested_qty.max(0)
            } else {
                current
            };
            CapResult {
                next_qty: next,
                added_qty: 0,
                capped: next < requested_qty,
                out_of_stock: false,
                unknown_stock: requested_qty > current,
            }
        }
        Some(stock) => {
            let next = requested_qty.max(0).min(stock.max(0));
            CapResult {
                next_qty: next,
                added_qty: 0,
                capped: next < requested_qty,
                out_of_stock: stock <= 0,
                unknown_stock: false,
            }
        }
    }
}

// =============================================================================
// Stock Limit Events
// =============================================================================

/// Why a requested quantity change was reduced or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLimitReason {
    OutOfStock,
    Capped,
    UnknownStock,
}

/// Observable signal published when a cart operation hits a stock limit.
///
/// Not part of durable cart state; the ledger clears/replaces it on each
/// capped operation and the UI renders it as a transient notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLimitEvent {
    pub item_id: String,
    pub available_stock: Option<i64>,
    pub reason: StockLimitReason,
    pub requested_qty: i64,
    pub next_qty: i64,
    pub at: DateTime<Utc>,
}

impl StockLimitEvent {
    /// Builds the event for a limited cap result.
    ///
    /// Returns `None` when the result was not limited at all.
    pub fn from_cap(
        item_id: &str,
        requested_qty: i64,
        available_stock: Option<i64>,
        cap: &CapResult,
    ) -> Option<Self> {
        let reason = if cap.out_of_stock {
            StockLimitReason::OutOfStock
        } else if cap.unknown_stock {
            StockLimitReason::UnknownStock
        } else if cap.capped {
            StockLimitReason::Capped
        } else {
            return None;
        };
        Some(StockLimitEvent {
            item_id: item_id.to_string(),
            available_stock,
            reason,
            requested_qty,
            next_qty: cap.next_qty,
            at: Utc::now(),
        })
    }
}

impl CapResult {
    /// Whether any limit fired (capped, out of stock, or unknown stock).
    pub fn limited(&self) -> bool {
        self.capped || self.out_of_stock || self.unknown_stock
    }
}

// =============================================================================
// Stock Lookup
// =============================================================================

/// Read access to the last-known stock snapshot for an item.
///
/// ## Contract
/// - `None` means "not yet known", never "zero"
/// - implementations must never return a negative number for a known value
///
/// Implemented by the shared stock cache in vend-scan and by test doubles.
pub trait StockLookup: Send + Sync {
    fn available(&self, id: &str, barcode: Option<&str>) -> Option<i64>;
}

// =============================================================================
// Unit + Property Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_examples_from_regressions() {
        let r = cap_add_quantity(2, 2, Some(3));
        assert_eq!(r.next_qty, 3);
        assert_eq!(r.added_qty, 1);
        assert!(r.capped);
        assert!(!r.out_of_stock);

        let r = cap_add_quantity(3, 1, Some(3));
        assert_eq!(r.next_qty, 3);
        assert_eq!(r.added_qty, 0);
        assert!(r.capped);
    }

    #[test]
    fn test_add_unknown_stock_blocks_increase() {
        let r = cap_add_quantity(2, 1, None);
        assert_eq!(r.next_qty, 2);
        assert_eq!(r.added_qty, 0);
        assert!(r.unknown_stock);
        assert!(r.capped);
    }

    #[test]
    fn test_add_out_of_stock() {
        let r = cap_add_quantity(0, 5, Some(0));
        assert_eq!(r.next_qty, 0);
        assert_eq!(r.added_qty, 0);
        assert!(r.out_of_stock);
        assert!(r.capped);

        // Negative stock figures are treated as zero ceiling.
        let r = cap_add_quantity(0, 1, Some(-3));
        assert_eq!(r.next_qty, 0);
        assert!(r.out_of_stock);
    }

    #[test]
    fn test_add_does_not_shrink_existing_line() {
        // Stock shrank below what's already in the cart: the add is refused
        // but the line is not reduced. Set-mode handles reductions.
        let r = cap_add_quantity(5, 1, Some(3));
        assert_eq!(r.next_qty, 5);
        assert_eq!(r.added_qty, 0);
        assert!(r.capped);
    }

    #[test]
    fn test_set_unknown_stock_allows_decrease_only() {
        let r = cap_requested_quantity(5, 3, None);
        assert_eq!(r.next_qty, 3);
        assert!(!r.unknown_stock);

        let r = cap_requested_quantity(5, 9, None);
        assert_eq!(r.next_qty, 5);
        assert!(r.unknown_stock);
        assert!(r.capped);
    }

    #[test]
    fn test_set_routes_below_zero_to_zero() {
        let r = cap_requested_quantity(5, -2, Some(10));
        assert_eq!(r.next_qty, 0);

        let r = cap_requested_quantity(5, -2, None);
        assert_eq!(r.next_qty, 0);
    }

    #[test]
    fn test_event_reason_precedence() {
        let cap = cap_add_quantity(0, 5, Some(0));
        let evt = StockLimitEvent::from_cap("p1", 5, Some(0), &cap).unwrap();
        assert_eq!(evt.reason, StockLimitReason::OutOfStock);

        let cap = cap_add_quantity(1, 1, None);
        let evt = StockLimitEvent::from_cap("p1", 1, None, &cap).unwrap();
        assert_eq!(evt.reason, StockLimitReason::UnknownStock);
        assert_eq!(evt.available_stock, None);

        let cap = cap_add_quantity(1, 1, Some(5));
        assert!(StockLimitEvent::from_cap("p1", 1, Some(5), &cap).is_none());
    }

    proptest! {
        #[test]
        fn prop_add_known_stock_is_min(cur in 0i64..1000, add in 0i64..1000, stock in 0i64..1000) {
            // Deliberately narrowed to stock >= cur: min(cur + add, stock)
            // only describes lines at or under the ceiling. When stock has
            // shrunk below an existing line, add-mode refuses the increase
            // without reducing the line (prop_add_shrunken_stock_holds_line
            // below); set-mode owns reductions.
            prop_assume!(stock >= cur);
            let r = cap_add_quantity(cur, add, Some(stock));
            prop_assert_eq!(r.next_qty, (cur + add).min(stock));
            prop_assert_eq!(r.capped, r.next_qty < cur + add);
            prop_assert_eq!(r.added_qty, r.next_qty - cur);
            prop_assert!(r.next_qty >= 0);
        }

        #[test]
        fn prop_add_shrunken_stock_holds_line(cur in 1i64..1000, add in 0i64..1000, stock in 0i64..1000) {
            prop_assume!(stock < cur);
            let r = cap_add_quantity(cur, add, Some(stock));
            prop_assert_eq!(r.next_qty, cur);
            prop_assert_eq!(r.added_qty, 0);
            prop_assert_eq!(r.capped, add > 0);
        }

        #[test]
        fn prop_add_unknown_never_increases(cur in 0i64..1000, add in 0i64..1000) {
            let r = cap_add_quantity(cur, add, None);
            prop_assert!(r.next_qty <= cur);
            prop_assert_eq!(r.added_qty, 0);
            prop_assert!(r.unknown_stock);
        }

        #[test]
        fn prop_set_unknown_decrease_always_succeeds(cur in 1i64..1000, req in 0i64..1000) {
            prop_assume!(req < cur);
            let r = cap_requested_quantity(cur, req, None);
            prop_assert_eq!(r.next_qty, req);
            prop_assert!(!r.unknown_stock);
        }

        #[test]
        fn prop_set_to_self_idempotent(q in 0i64..1000, stock in 0i64..2000) {
            prop_assume!(stock >= q);
            let r = cap_requested_quantity(q, q, Some(stock));
            prop_assert_eq!(r.next_qty, q);
            prop_assert!(!r.capped);
        }

        #[test]
        fn prop_repeated_add_converges_to_stock(add in 1i64..5) {
            // Regression: 20 scans of the same item with stock 1 must
            // converge to and stay at quantity 1.
            let mut qty = 0i64;
            for _ in 0..20 {
                let r = cap_add_quantity(qty, add, Some(1));
                qty = r.next_qty;
            }
            prop_assert_eq!(qty, 1);
        }
    }
}
