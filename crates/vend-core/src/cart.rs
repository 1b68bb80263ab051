//! # Cart Ledger
//!
//! The authoritative state of the current sale: items, discounts, computed
//! totals, a mutation-history stack enabling undo, and a lock used during
//! checkout.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cart Ledger Operations                             │
//! │                                                                         │
//! │  Scan / UI Action         Ledger Call            State Change           │
//! │  ───────────────          ───────────            ────────────           │
//! │                                                                         │
//! │  Accepted scan ──────────► add_item() ─────────► merge or push line     │
//! │                                │                 (delta capped against  │
//! │                                │                  the stock snapshot)   │
//! │  Quantity edit ──────────► update_quantity() ──► set line, ≤0 removes   │
//! │  Remove tap ─────────────► remove_item()                                │
//! │  Discount entry ─────────► apply_discount() / apply_item_discount()     │
//! │  Cancel sale ────────────► clear()                                      │
//! │  Undo tap ───────────────► undo_last_action() ─► pop + reverse exactly  │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                    ┌───────────────────────┐                            │
//! │                    │ recalculate totals    │  (always a full recompute, │
//! │                    │ persist snapshot hook │   never patched in place)  │
//! │                    └───────────────────────┘                            │
//! │                                                                         │
//! │  While locked (checkout in flight) every mutator is a silent no-op;     │
//! │  clear/remove can be forced for post-payment teardown.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why Silent No-ops?
//! A policy rejection (locked ledger, capped stock, unknown line) must never
//! throw: this code runs under a live checkout and an escaped error would
//! strand the device mid-sale. Limits surface as [`StockLimitEvent`]s, not
//! as `Err`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreResult;
use crate::money::{Discount, Money};
use crate::stock::{
    cap_add_quantity, cap_requested_quantity, StockLimitEvent, StockLookup,
};

// =============================================================================
// Cart Item
// =============================================================================

/// A line in the cart.
///
/// ## Design Notes
/// - `price_minor` is frozen at add time; a later catalog price change does
///   not move lines already rung up
/// - `metadata` and `flags` use ordered collections so union-merges are
///   deterministic and snapshot equality is stable across undo cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product id (UUID).
    pub id: String,

    /// Display name at time of adding (frozen).
    pub name: String,

    /// Unit price in minor currency units (frozen).
    pub price_minor: Money,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Quantity in cart; a stored line is always >= 1.
    pub quantity: i64,

    /// Barcode, when the line was rung up by scanning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,

    /// Per-line discount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_discount: Option<Discount>,

    /// Free-form host metadata (batch, salesperson, ...). Union-merged when
    /// the same product is added again.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Behavioral flags (e.g. "price-overridden"). Union-merged.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<String>,
}

impl CartItem {
    /// Creates a plain line with quantity 1 and no extras.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price_minor: Money,
        currency: impl Into<String>,
    ) -> Self {
        CartItem {
            id: id.into(),
            name: name.into(),
            price_minor,
            currency: currency.into(),
            quantity: 1,
            barcode: None,
            item_discount: None,
            metadata: BTreeMap::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Line subtotal before discounts (unit price × quantity).
    pub fn line_subtotal(&self) -> Money {
        self.price_minor * self.quantity
    }

    /// Per-line discount amount against this line's subtotal.
    pub fn line_discount(&self) -> Money {
        match &self.item_discount {
            Some(d) => d.amount_off(self.line_subtotal()),
            None => Money::zero(),
        }
    }

    /// Merges another add of the same product into this line.
    ///
    /// Metadata and flags are union-merged (incoming wins on key clashes);
    /// the line discount is preserved unless the incoming add carries one.
    fn merge_from(&mut self, incoming: CartItem) {
        if incoming.item_discount.is_some() {
            self.item_discount = incoming.item_discount;
        }
        self.metadata.extend(incoming.metadata);
        self.flags.extend(incoming.flags);
        if self.barcode.is_none() {
            self.barcode = incoming.barcode;
        }
    }
}

// =============================================================================
// Cart Mutation (undo history)
// =============================================================================

/// One reversible ledger mutation.
///
/// Pushed on every mutating call, popped and replayed in reverse by undo.
/// Never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartMutation {
    /// A line was inserted or updated. `previous_item == None` means the
    /// line did not exist before (undo removes it outright).
    UpsertItem {
        item_id: String,
        previous_item: Option<CartItem>,
        previous_index: usize,
    },

    /// A line was removed; `previous_index` allows exact reinsertion.
    RemoveItem {
        item_id: String,
        previous_item: Option<CartItem>,
        previous_index: usize,
    },

    /// The whole cart (or the cart-level discount) changed; carries a full
    /// snapshot for wholesale restore.
    ClearCart {
        previous_items: Vec<CartItem>,
        previous_discount: Option<Discount>,
    },
}

// =============================================================================
// Cart Totals
// =============================================================================

/// The five derived totals.
///
/// Invariant: always a pure recomputation from items + discount, never
/// incrementally patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Money,
    pub item_discount_amount: Money,
    pub cart_discount_amount: Money,
    pub discount_total: Money,
    pub total: Money,
}

impl CartTotals {
    /// Recomputes all five totals from scratch.
    ///
    /// `cart_discount` applies to `max(0, subtotal - item discounts)`, so a
    /// cart-level percentage never double-counts amounts a line discount
    /// already took off.
    pub fn compute(items: &[CartItem], cart_discount: Option<&Discount>) -> Self {
        let subtotal = items
            .iter()
            .fold(Money::zero(), |acc, i| acc + i.line_subtotal());
        let item_discount_amount = items
            .iter()
            .fold(Money::zero(), |acc, i| acc + i.line_discount());

        let discountable = subtotal.sub_clamped(item_discount_amount);
        let cart_discount_amount = match cart_discount {
            Some(d) => d.amount_off(discountable),
            None => Money::zero(),
        };

        let discount_total = item_discount_amount + cart_discount_amount;
        CartTotals {
            subtotal,
            item_discount_amount,
            cart_discount_amount,
            discount_total,
            total: subtotal.sub_clamped(discount_total),
        }
    }
}

// =============================================================================
// Persistence Hook
// =============================================================================

/// Thin save hook invoked after every mutation.
///
/// Only items and the cart discount are persisted - totals are derived and
/// the mutation history is session-local. Implementations must not block
/// the caller (the sqlite store spawns the write onto its runtime).
pub trait CartStore: Send + Sync {
    fn persist(&self, snapshot: &CartSnapshot);
}

/// The persisted portion of the ledger, stored under a store-scoped key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Discount>,
}

impl CartSnapshot {
    /// Encodes the snapshot as JSON for storage.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a stored snapshot.
    pub fn from_json(payload: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

// =============================================================================
// Cart Ledger
// =============================================================================

/// The cart ledger.
///
/// ## Ownership
/// The ledger exclusively owns its state and is the only writer; the scan
/// dispatcher only calls these public operations. Stock is read through the
/// injected [`StockLookup`] (the shared snapshot cache) at mutation time.
pub struct CartLedger {
    items: Vec<CartItem>,
    discount: Option<Discount>,
    history: Vec<CartMutation>,
    locked: bool,
    totals: CartTotals,
    stock_limit: Option<StockLimitEvent>,
    stock: Arc<dyn StockLookup>,
    store: Option<Arc<dyn CartStore>>,
}

impl CartLedger {
    /// Creates an empty ledger reading stock through `stock`.
    pub fn new(stock: Arc<dyn StockLookup>) -> Self {
        CartLedger {
            items: Vec::new(),
            discount: None,
            history: Vec::new(),
            locked: false,
            totals: CartTotals::default(),
            stock_limit: None,
            stock,
            store: None,
        }
    }

    /// Attaches a persistence hook, invoked after every mutation.
    pub fn with_store(mut self, store: Arc<dyn CartStore>) -> Self {
        self.store = Some(store);
        self
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn discount(&self) -> Option<&Discount> {
        self.discount.as_ref()
    }

    pub fn totals(&self) -> &CartTotals {
        &self.totals
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of recorded (undoable) mutations.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The latest stock-limit signal, if the most recent operation hit one.
    /// Cleared/replaced on each mutating operation.
    pub fn last_stock_limit(&self) -> Option<&StockLimitEvent> {
        self.stock_limit.as_ref()
    }

    /// Snapshot of the persisted portion (items + cart discount).
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.clone(),
            discount: self.discount.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Adds `quantity` of `item`, merging into an existing line by id.
    ///
    /// The quantity delta goes through `cap_add_quantity` against the stock
    /// snapshot for the item's id/barcode. When nothing can be added the
    /// call is a no-op apart from the published [`StockLimitEvent`].
    pub fn add_item(&mut self, item: CartItem, quantity: i64) {
        if self.locked {
            debug!(item_id = %item.id, "add_item ignored: ledger locked");
            return;
        }
        self.stock_limit = None;

        let available = self.stock.available(&item.id, item.barcode.as_deref());
        let existing_index = self.items.iter().position(|i| i.id == item.id);
        let current_qty = existing_index.map_or(0, |i| self.items[i].quantity);

        let cap = cap_add_quantity(current_qty, quantity, available);
        if cap.limited() {
            self.stock_limit = StockLimitEvent::from_cap(&item.id, quantity, available, &cap);
        }
        if cap.added_qty <= 0 {
            debug!(
                item_id = %item.id,
                requested = quantity,
                available = ?available,
                "add_item refused by stock cap"
            );
            return;
        }

        match existing_index {
            Some(index) => {
                let previous = self.items[index].clone();
                self.history.push(CartMutation::UpsertItem {
                    item_id: item.id.clone(),
                    previous_item: Some(previous),
                    previous_index: index,
                });
                let line = &mut self.items[index];
                line.merge_from(item);
                line.quantity = cap.next_qty;
            }
            None => {
                let mut line = item;
                line.quantity = cap.next_qty;
                self.history.push(CartMutation::UpsertItem {
                    item_id: line.id.clone(),
                    previous_item: None,
                    previous_index: self.items.len(),
                });
                self.items.push(line);
            }
        }

        self.after_mutation();
    }

    /// Removes the line for `item_id`, recording its position for exact
    /// undo reinsertion. No-op when locked unless `force`.
    pub fn remove_item(&mut self, item_id: &str, force: bool) {
        if self.locked && !force {
            debug!(item_id, "remove_item ignored: ledger locked");
            return;
        }
        let Some(index) = self.items.iter().position(|i| i.id == item_id) else {
            debug!(item_id, "remove_item: no such line");
            return;
        };
        self.stock_limit = None;

        let removed = self.items.remove(index);
        self.history.push(CartMutation::RemoveItem {
            item_id: item_id.to_string(),
            previous_item: Some(removed),
            previous_index: index,
        });

        self.after_mutation();
    }

    /// Sets the quantity of `item_id` to exactly `quantity` (capped). A
    /// resulting quantity <= 0 routes to [`CartLedger::remove_item`].
    pub fn update_quantity(&mut self, item_id: &str, quantity: i64) {
        if self.locked {
            debug!(item_id, "update_quantity ignored: ledger locked");
            return;
        }
        let Some(index) = self.items.iter().position(|i| i.id == item_id) else {
            debug!(item_id, "update_quantity: no such line");
            return;
        };

        let current = self.items[index].quantity;
        let available = self
            .stock
            .available(item_id, self.items[index].barcode.as_deref());
        let cap = cap_requested_quantity(current, quantity, available);

        if cap.next_qty <= 0 {
            self.remove_item(item_id, false);
            // remove_item cleared the slot; re-publish if the zero came
            // from a stock limit rather than an explicit zero request.
            if cap.limited() {
                self.stock_limit =
                    StockLimitEvent::from_cap(item_id, quantity, available, &cap);
            }
            return;
        }

        self.stock_limit = if cap.limited() {
            StockLimitEvent::from_cap(item_id, quantity, available, &cap)
        } else {
            None
        };

        if cap.next_qty == current {
            // Nothing to record; the request was fully absorbed by the cap
            // or asked for the current quantity.
            return;
        }

        self.history.push(CartMutation::UpsertItem {
            item_id: item_id.to_string(),
            previous_item: Some(self.items[index].clone()),
            previous_index: index,
        });
        self.items[index].quantity = cap.next_qty;

        self.after_mutation();
    }

    /// Sets the per-line discount for `item_id`.
    pub fn apply_item_discount(&mut self, item_id: &str, discount: Discount) {
        self.set_item_discount(item_id, Some(discount));
    }

    /// Clears the per-line discount for `item_id`.
    pub fn remove_item_discount(&mut self, item_id: &str) {
        self.set_item_discount(item_id, None);
    }

    fn set_item_discount(&mut self, item_id: &str, discount: Option<Discount>) {
        if self.locked {
            debug!(item_id, "item discount change ignored: ledger locked");
            return;
        }
        let Some(index) = self.items.iter().position(|i| i.id == item_id) else {
            debug!(item_id, "item discount change: no such line");
            return;
        };
        self.stock_limit = None;

        self.history.push(CartMutation::UpsertItem {
            item_id: item_id.to_string(),
            previous_item: Some(self.items[index].clone()),
            previous_index: index,
        });
        self.items[index].item_discount = discount;

        self.after_mutation();
    }

    /// Sets the cart-level discount.
    pub fn apply_discount(&mut self, discount: Discount) {
        self.set_cart_discount(Some(discount));
    }

    /// Clears the cart-level discount.
    pub fn remove_discount(&mut self) {
        self.set_cart_discount(None);
    }

    fn set_cart_discount(&mut self, discount: Option<Discount>) {
        if self.locked {
            debug!("cart discount change ignored: ledger locked");
            return;
        }
        self.stock_limit = None;

        // Snapshot mutation: items are untouched, so undo restores them
        // identically and brings the previous discount back.
        self.history.push(CartMutation::ClearCart {
            previous_items: self.items.clone(),
            previous_discount: self.discount.clone(),
        });
        self.discount = discount;

        self.after_mutation();
    }

    /// Empties items and discount, recording a full snapshot for undo.
    /// Respects the lock unless `force`.
    pub fn clear(&mut self, force: bool) {
        if self.locked && !force {
            debug!("clear ignored: ledger locked");
            return;
        }
        self.stock_limit = None;

        self.history.push(CartMutation::ClearCart {
            previous_items: std::mem::take(&mut self.items),
            previous_discount: self.discount.take(),
        });

        self.after_mutation();
    }

    /// Pops the most recent mutation and reverses it exactly.
    ///
    /// Reinsertion happens at `min(previous_index, len)`; restored
    /// quantities are renormalized against *current* stock (downward only),
    /// since stock may have changed since the snapshot was taken.
    pub fn undo_last_action(&mut self) {
        if self.locked {
            debug!("undo ignored: ledger locked");
            return;
        }
        let Some(mutation) = self.history.pop() else {
            debug!("undo: empty history");
            return;
        };
        self.stock_limit = None;

        match mutation {
            CartMutation::UpsertItem {
                item_id,
                previous_item,
                previous_index,
            }
            | CartMutation::RemoveItem {
                item_id,
                previous_item,
                previous_index,
            } => {
                self.items.retain(|i| i.id != item_id);
                if let Some(previous) = previous_item {
                    let index = previous_index.min(self.items.len());
                    if let Some(restored) = Self::renormalize(self.stock.as_ref(), previous) {
                        self.items.insert(index, restored);
                    }
                }
            }
            CartMutation::ClearCart {
                previous_items,
                previous_discount,
            } => {
                let stock = self.stock.clone();
                self.items = previous_items
                    .into_iter()
                    .filter_map(|i| Self::renormalize(stock.as_ref(), i))
                    .collect();
                self.discount = previous_discount;
            }
        }

        self.after_mutation();
    }

    /// Locks the ledger for checkout; all mutators become no-ops.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Unlocks the ledger after checkout completes or aborts.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Replaces state wholesale from a persisted snapshot.
    ///
    /// Applied once on load: quantities are renormalized downward against
    /// current stock, history starts empty, and the store hook is *not*
    /// invoked (the snapshot just came from it).
    pub fn rehydrate(&mut self, snapshot: CartSnapshot) {
        let stock = self.stock.clone();
        self.items = snapshot
            .items
            .into_iter()
            .filter_map(|i| Self::renormalize(stock.as_ref(), i))
            .collect();
        self.discount = snapshot.discount;
        self.history.clear();
        self.stock_limit = None;
        self.totals = CartTotals::compute(&self.items, self.discount.as_ref());
        debug!(lines = self.items.len(), "cart rehydrated");
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Downward-only renormalization of a restored line against current
    /// stock. Lines that fall to zero are dropped.
    fn renormalize(stock: &dyn StockLookup, mut item: CartItem) -> Option<CartItem> {
        let available = stock.available(&item.id, item.barcode.as_deref());
        let cap = cap_requested_quantity(item.quantity, item.quantity, available);
        if cap.next_qty <= 0 {
            debug!(item_id = %item.id, "restored line dropped: out of stock");
            return None;
        }
        item.quantity = cap.next_qty;
        Some(item)
    }

    /// Recompute + persist, invoked after every applied mutation.
    fn after_mutation(&mut self) {
        self.totals = CartTotals::compute(&self.items, self.discount.as_ref());
        if let Some(store) = &self.store {
            store.persist(&self.snapshot());
        }
        debug!(
            lines = self.items.len(),
            total = %self.totals.total,
            history = self.history.len(),
            "cart mutated"
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
