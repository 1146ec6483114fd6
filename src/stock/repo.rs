use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::repo_types::{AggregateRecord, Removal, Snapshot, StockAggregate, StockRecord, StockRow};
use crate::{
    db::{PgStore, StoreError},
    types::Upc,
};

#[async_trait]
pub trait StockRepo: Send + Sync {
    async fn insert_stock_row(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<StockRow, StoreError>;

    /// Adds `quantity` to the oldest row of `upc` that still holds stock and refreshes its
    /// snapshot, as one conditional write. `None` when every row is depleted.
    async fn replenish_oldest(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<Option<StockRow>, StoreError>;

    async fn stock_row(&self, id: Uuid) -> Result<Option<StockRow>, StoreError>;

    /// All rows of `upc`, oldest first.
    async fn stock_rows_for(&self, upc: &Upc) -> Result<Vec<StockRow>, StoreError>;

    async fn list_stock_rows(&self) -> Result<Vec<StockRow>, StoreError>;

    async fn stock_aggregates(&self) -> Result<Vec<StockAggregate>, StoreError>;

    async fn stock_available(&self, upc: &Upc) -> Result<i64, StoreError>;

    /// Decrements by `units` only while the row holds at least that many.
    /// Returns the new quantity, or `None` when the condition failed or the row is gone.
    async fn decrement_if_available(&self, id: Uuid, units: i64) -> Result<Option<i64>, StoreError>;

    /// Puts back units taken by a decrement that has to be undone.
    async fn restore_stock(&self, id: Uuid, units: i64) -> Result<bool, StoreError>;

    async fn delete_stock_row(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn record_removal(&self, removal: &Removal) -> Result<(), StoreError>;
}

#[async_trait]
impl StockRepo for PgStore {
    async fn insert_stock_row(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<StockRow, StoreError> {
        let row = sqlx::query_as::<_, StockRecord>(
            r#"
            INSERT INTO stock (id, upc, quantity, name, tags, ingredients, nutrition)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, seq, upc, quantity, name, tags, ingredients, nutrition, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(upc.as_str())
        .bind(quantity)
        .bind(&snapshot.name)
        .bind(snapshot.tags.clone())
        .bind(snapshot.ingredients.clone())
        .bind(Json(snapshot.nutrition.clone()))
        .fetch_one(self.pool()?)
        .await?;
        Ok(row.into())
    }

    async fn replenish_oldest(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<Option<StockRow>, StoreError> {
        let row = sqlx::query_as::<_, StockRecord>(
            r#"
            UPDATE stock
               SET quantity = quantity + $2,
                   name = $3, tags = $4, ingredients = $5, nutrition = $6,
                   updated_at = now()
             WHERE id = (SELECT id FROM stock
                          WHERE upc = $1 AND quantity > 0
                          ORDER BY seq
                          LIMIT 1
                          FOR UPDATE)
               AND quantity > 0
            RETURNING id, seq, upc, quantity, name, tags, ingredients, nutrition, created_at, updated_at
            "#,
        )
        .bind(upc.as_str())
        .bind(quantity)
        .bind(&snapshot.name)
        .bind(snapshot.tags.clone())
        .bind(snapshot.ingredients.clone())
        .bind(Json(snapshot.nutrition.clone()))
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn stock_row(&self, id: Uuid) -> Result<Option<StockRow>, StoreError> {
        let row = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT id, seq, upc, quantity, name, tags, ingredients, nutrition, created_at, updated_at
              FROM stock
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn stock_rows_for(&self, upc: &Upc) -> Result<Vec<StockRow>, StoreError> {
        let rows = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT id, seq, upc, quantity, name, tags, ingredients, nutrition, created_at, updated_at
              FROM stock
             WHERE upc = $1
             ORDER BY seq
            "#,
        )
        .bind(upc.as_str())
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_stock_rows(&self) -> Result<Vec<StockRow>, StoreError> {
        let rows = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT id, seq, upc, quantity, name, tags, ingredients, nutrition, created_at, updated_at
              FROM stock
             ORDER BY seq
            "#,
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stock_aggregates(&self) -> Result<Vec<StockAggregate>, StoreError> {
        let rows = sqlx::query_as::<_, AggregateRecord>(
            r#"
            SELECT s.upc,
                   (SELECT n.name FROM stock n WHERE n.upc = s.upc ORDER BY n.seq DESC LIMIT 1) AS name,
                   LEAST(SUM(s.quantity), 9223372036854775807)::BIGINT AS quantity,
                   COUNT(*) AS rows
              FROM stock s
             GROUP BY s.upc
             ORDER BY MIN(s.seq)
            "#,
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stock_available(&self, upc: &Upc) -> Result<i64, StoreError> {
        let (available,) = sqlx::query_as::<_, (i64,)>(
            "SELECT LEAST(COALESCE(SUM(quantity), 0), 9223372036854775807)::BIGINT FROM stock WHERE upc = $1",
        )
        .bind(upc.as_str())
        .fetch_one(self.pool()?)
        .await?;
        Ok(available)
    }

    async fn decrement_if_available(&self, id: Uuid, units: i64) -> Result<Option<i64>, StoreError> {
        let left = sqlx::query_as::<_, (i64,)>(
            r#"
            UPDATE stock
               SET quantity = quantity - $2, updated_at = now()
             WHERE id = $1 AND quantity >= $2
            RETURNING quantity
            "#,
        )
        .bind(id)
        .bind(units)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(left.map(|(q,)| q))
    }

    async fn restore_stock(&self, id: Uuid, units: i64) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE stock SET quantity = quantity + $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(units)
        .execute(self.pool()?)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_stock_row(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM stock WHERE id = $1")
            .bind(id)
            .execute(self.pool()?)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn record_removal(&self, removal: &Removal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_removals (id, upc, units, reason, removed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(removal.id)
        .bind(removal.upc.as_str())
        .bind(removal.units)
        .bind(&removal.reason)
        .bind(removal.timestamp)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }
}
