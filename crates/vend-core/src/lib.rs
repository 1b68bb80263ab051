//! # vend-core: Pure Business Logic for Vend POS
//!
//! This crate is the **heart** of the scan-to-cart pipeline. It contains all
//! business logic as pure functions and plain state machines with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Scan-to-Cart Event Pipeline                          │
//! │                                                                         │
//! │  raw key events ──► vend-scan (reconstructor, guards, dispatcher)       │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │               ★ vend-core (THIS CRATE) ★                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────────────────────┐   │    │
//! │  │   │   money   │  │   stock   │  │          cart             │   │    │
//! │  │   │   Money   │  │ cap_add   │  │  CartLedger + undo stack  │   │    │
//! │  │   │  Discount │  │ cap_req   │  │  CartItem / CartMutation  │   │    │
//! │  │   └───────────┘  └───────────┘  └───────────────────────────┘   │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO TIMERS                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                    vend-db (persisted cart snapshots)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Minor-unit money and discount math (no floating point drift!)
//! - [`stock`] - Stock cap engine: pure quantity clamping against inventory
//! - [`cart`] - Cart ledger: items, discounts, totals, reversible mutations
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: The cap engine is total - every input has a result
//! 2. **No I/O**: Database, network, timers are FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in minor units (i64)
//! 4. **Never Crash a Checkout**: Policy rejections (locked ledger, capped
//!    stock, unknown item) are silent no-ops or observable events - never
//!    panics, never errors that escape to the till

pub mod cart;
pub mod error;
pub mod money;
pub mod stock;

pub use cart::{CartItem, CartLedger, CartMutation, CartSnapshot, CartStore, CartTotals};
pub use error::{CoreError, CoreResult};
pub use money::{Discount, Money, MAX_FIXED_DISCOUNT_MINOR};
pub use stock::{
    cap_add_quantity, cap_requested_quantity, CapResult, StockLimitEvent, StockLimitReason,
    StockLookup,
};
