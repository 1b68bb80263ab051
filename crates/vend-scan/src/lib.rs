//! # vend-scan: Scan-to-Cart Event Pipeline
//!
//! Turns a raw, timing-ambiguous keystroke/text stream from a keyboard-wedge
//! barcode scanner into cart mutations, surviving adversarial input along
//! the way (scanner double-fires, camera frame repeats, scan storms).
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Scan-to-Cart Event Pipeline                         │
//! │                                                                         │
//! │  raw key events / cumulative text                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────┐   burst timing says "scanner",                    │
//! │  │  Reconstructor   │──  not "human typing"                             │
//! │  └────────┬─────────┘                                                   │
//! │           │ CommittedScan (camera decodes join here)                    │
//! │           ▼                                                             │
//! │  ┌──────────────────┐   1. raw duplicate window        (600 ms)         │
//! │  │    Dispatcher    │   2. purchase confirmation slot                   │
//! │  │   guard chain    │   3. (intent, mode, value) window (800 ms)        │
//! │  └────────┬─────────┘   4. store-inactive gate                          │
//! │           │             5. storm guard (12 / 2000 ms → 1500 ms cooldown)│
//! │           ▼                                                             │
//! │  product lookup (online/offline, via ScanHost)                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  stock cache refresh ──► CartLedger::add_item (capped) ──► totals       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`clock`] - injectable monotonic clock (deterministic tests)
//! - [`reconstructor`] - keystroke stream reconstructor
//! - [`guards`] - duplicate windows and the storm guard
//! - [`dispatcher`] - guard chain, intent resolution, cart side effects
//! - [`stock_cache`] - shared last-write-wins stock snapshot table
//! - [`pipeline`] - reconstructor + dispatcher wiring, scanner-health ping
//! - [`error`] - lookup failure taxonomy

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod guards;
pub mod pipeline;
pub mod reconstructor;
pub mod stock_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherConfig, LookupOutcome, Notice, NoticeTone, Product,
    ScanHost, ScanIntent, ScanMode,
};
pub use error::LookupError;
pub use pipeline::ScanPipeline;
pub use reconstructor::{CommittedScan, Reconstructor, ReconstructorConfig, ScanSource};
pub use stock_cache::StockCache;
