//! # vend-db: Persistence Layer
//!
//! Local SQLite storage for the scan pipeline. Two concerns live here:
//!
//! 1. **Offline product cache** - a local mirror of the catalog so scans
//!    resolve without the network when `online` is off or the backend is
//!    unreachable.
//! 2. **Cart snapshots** - the cart ledger persists a JSON snapshot after
//!    every mutation; on startup the host rehydrates from it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (pool handle)                                                 │
//! │       │                                                                 │
//! │       ├── products()  → ProductRepository   (offline lookup, upserts)   │
//! │       └── carts()     → CartRepository      (snapshot save/load)        │
//! │                                                                         │
//! │  SqliteCartStore implements vend_core::CartStore by spawning the        │
//! │  snapshot write onto the runtime, so cart mutations never block on      │
//! │  disk I/O.                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod store;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::cart::CartRepository;
pub use repository::product::ProductRepository;
pub use store::SqliteCartStore;
