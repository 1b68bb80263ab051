//! # Cart Snapshot Repository
//!
//! One JSON snapshot per store, overwritten after every cart mutation.
//! The payload is the `CartSnapshot` wire form from vend-core; this
//! repository never interprets it beyond decode.
//!
//! A corrupt payload decodes to `None` with a warning instead of an error:
//! the host treats it as an empty cart rather than refusing to start.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use vend_core::CartSnapshot;

/// Repository for persisted cart snapshots.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Saves (or overwrites) the snapshot for a store.
    pub async fn save(&self, store_id: &str, snapshot: &CartSnapshot) -> DbResult<()> {
        let payload = snapshot.to_json()?;
        sqlx::query(
            r#"
            INSERT INTO cart_snapshots (store_id, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (store_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(store_id)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(store_id, bytes = payload.len(), "cart snapshot saved");
        Ok(())
    }

    /// Loads the snapshot for a store. Missing row and corrupt payload both
    /// come back as `None`.
    pub async fn load(&self, store_id: &str) -> DbResult<Option<CartSnapshot>> {
        let payload: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM cart_snapshots WHERE store_id = ?1")
                .bind(store_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((payload,)) = payload else {
            return Ok(None);
        };

        match CartSnapshot::from_json(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(store_id, error = %err, "corrupt cart snapshot; treating as empty");
                Ok(None)
            }
        }
    }

    /// Deletes the snapshot for a store (checkout completed).
    pub async fn delete(&self, store_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cart_snapshots WHERE store_id = ?1")
            .bind(store_id)
            .execute(&self.pool)
            .await?;
        debug!(store_id, "cart snapshot deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vend_core::{CartItem, Money};

    fn snapshot_with_item() -> CartSnapshot {
        CartSnapshot {
            items: vec![CartItem::new(
                "p1",
                "Cola 330ml",
                Money::from_minor(8000),
                "PKR",
            )],
            discount: None,
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.carts();

        let snapshot = snapshot_with_item();
        repo.save("store-1", &snapshot).await.unwrap();

        let loaded = repo.load("store-1").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.carts();

        repo.save("store-1", &snapshot_with_item()).await.unwrap();
        let empty = CartSnapshot {
            items: vec![],
            discount: None,
        };
        repo.save("store-1", &empty).await.unwrap();

        let loaded = repo.load("store-1").await.unwrap().unwrap();
        assert!(loaded.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.carts().load("store-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_loads_as_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.carts();

        sqlx::query("INSERT INTO cart_snapshots (store_id, payload, updated_at) VALUES ('store-1', '{broken', '2026-01-01')")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(repo.load("store-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.carts();

        repo.save("store-1", &snapshot_with_item()).await.unwrap();
        repo.delete("store-1").await.unwrap();
        assert!(repo.load("store-1").await.unwrap().is_none());
    }
}
