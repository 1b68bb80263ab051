//! # Product Repository
//!
//! The local catalog mirror used for offline scan resolution.
//!
//! ## Role in the Scan Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  scan "5449000000996"                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  online?  ──yes──► remote catalog, then upsert() the result here        │
//! │       │                                                                 │
//! │       no                                                                │
//! │       ▼                                                                 │
//! │  get_by_barcode("5449000000996") ← this repository                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful remote resolution is upserted, so the mirror converges
//! toward the products this store actually sells.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use vend_core::Money;
use vend_scan::Product;

/// Row shape for the products table.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price_minor: Option<i64>,
    currency: String,
    barcode: Option<String>,
    available_stock: Option<i64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price_minor: row.price_minor.map(Money::from_minor),
            currency: row.currency,
            barcode: row.barcode,
            available_stock: row.available_stock,
        }
    }
}

const SELECT_COLUMNS: &str = "id, name, price_minor, currency, barcode, available_stock";

/// Repository for the local product mirror.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Looks a product up by barcode (the offline scan path).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM products WHERE barcode = ?1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Looks a product up by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM products WHERE id = ?1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Inserts or replaces a product (called after every successful remote
    /// resolution, and by catalog sync).
    pub async fn upsert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "upserting product");
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_minor, currency, barcode, available_stock, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                price_minor = excluded.price_minor,
                currency = excluded.currency,
                barcode = excluded.barcode,
                available_stock = excluded.available_stock,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_minor.map(|m| m.minor()))
        .bind(&product.currency)
        .bind(&product.barcode)
        .bind(product.available_stock)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates only the stock figure (post-sale decrement from the backend).
    pub async fn set_stock(&self, id: &str, stock: Option<i64>) -> DbResult<()> {
        sqlx::query("UPDATE products SET available_stock = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(stock)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates a placeholder catalog entry for a freshly digitised barcode:
    /// no price, no stock, a generated id. The backend fills the rest in
    /// later.
    pub async fn create_placeholder(&self, barcode: &str, name: &str) -> DbResult<Product> {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price_minor: None,
            currency: "PKR".to_string(),
            barcode: Some(barcode.to_string()),
            available_stock: None,
        };
        self.upsert(&product).await?;
        debug!(id = %product.id, barcode, "placeholder product created");
        Ok(product)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
