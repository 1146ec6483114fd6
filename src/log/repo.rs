use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{LogEntry, LogRecord, NewLogEntry};
use crate::db::{PgStore, StoreError};

#[async_trait]
pub trait LogRepo: Send + Sync {
    async fn insert_log_entry(&self, new: &NewLogEntry) -> Result<LogEntry, StoreError>;

    /// Live entries with `from <= timestamp < to`, by timestamp then insertion order.
    /// No `to` means no upper bound.
    async fn log_entries_between(
        &self,
        from: OffsetDateTime,
        to: Option<OffsetDateTime>,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// `None` when the entry does not exist, otherwise whether this call flipped the flag.
    async fn soft_delete_log_entry(&self, id: Uuid) -> Result<Option<bool>, StoreError>;

    /// Tombstones the most recently inserted live entry, whatever its timestamp.
    async fn undo_last_log_entry(&self) -> Result<Option<LogEntry>, StoreError>;
}

#[async_trait]
impl LogRepo for PgStore {
    async fn insert_log_entry(&self, new: &NewLogEntry) -> Result<LogEntry, StoreError> {
        let row = sqlx::query_as::<_, LogRecord>(
            r#"
            INSERT INTO food_log (id, upc, units, nutrition, source, logged_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, seq, upc, units, nutrition, source, logged_at, deleted, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.upc.as_str())
        .bind(new.units)
        .bind(Json(new.nutrition.clone()))
        .bind(new.source.as_str())
        .bind(new.timestamp)
        .fetch_one(self.pool()?)
        .await?;
        Ok(row.into())
    }

    async fn log_entries_between(
        &self,
        from: OffsetDateTime,
        to: Option<OffsetDateTime>,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LogRecord>(
            r#"
            SELECT id, seq, upc, units, nutrition, source, logged_at, deleted, created_at
              FROM food_log
             WHERE NOT deleted AND logged_at >= $1
               AND ($2::timestamptz IS NULL OR logged_at < $2)
             ORDER BY logged_at, seq
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn soft_delete_log_entry(&self, id: Uuid) -> Result<Option<bool>, StoreError> {
        let pool = self.pool()?;
        let flipped = sqlx::query("UPDATE food_log SET deleted = TRUE WHERE id = $1 AND NOT deleted")
            .bind(id)
            .execute(pool)
            .await?;
        if flipped.rows_affected() > 0 {
            return Ok(Some(true));
        }
        let exists = sqlx::query_as::<_, (i32,)>("SELECT 1 FROM food_log WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(exists.map(|_| false))
    }

    async fn undo_last_log_entry(&self) -> Result<Option<LogEntry>, StoreError> {
        let row = sqlx::query_as::<_, LogRecord>(
            r#"
            UPDATE food_log
               SET deleted = TRUE
             WHERE id = (SELECT id FROM food_log
                          WHERE NOT deleted
                          ORDER BY seq DESC
                          LIMIT 1
                          FOR UPDATE SKIP LOCKED)
            RETURNING id, seq, upc, units, nutrition, source, logged_at, deleted, created_at
            "#,
        )
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }
}
