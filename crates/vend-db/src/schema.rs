//! # Schema Initialization
//!
//! Runtime, idempotent DDL. Every statement is `IF NOT EXISTS`, so
//! initialization is safe to run on every startup against both fresh and
//! existing database files.
//!
//! ## Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products          local catalog mirror for offline resolution          │
//! │                    (id, name, price_minor, currency, barcode, stock)    │
//! │                                                                         │
//! │  cart_snapshots    one JSON snapshot per store; the cart ledger         │
//! │                    overwrites it after every mutation                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        price_minor     INTEGER,
        currency        TEXT NOT NULL DEFAULT 'PKR',
        barcode         TEXT,
        available_stock INTEGER,
        updated_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_products_barcode
        ON products (barcode)
        WHERE barcode IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cart_snapshots (
        store_id    TEXT PRIMARY KEY,
        payload     TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )
    "#,
];

/// Applies the schema. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> DbResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DbError::SchemaInit(e.to_string()))?;
    }
    debug!(statements = SCHEMA.len(), "schema initialized");
    Ok(())
}
