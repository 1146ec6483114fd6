use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::db::{PgStore, StoreError};

/// Explicit per-macro overrides; defaults are applied above this layer.
#[async_trait]
pub trait TargetsRepo: Send + Sync {
    async fn target_overrides(&self) -> Result<BTreeMap<String, f64>, StoreError>;

    /// Upserts every given override in one write.
    async fn set_targets(&self, values: &BTreeMap<String, f64>) -> Result<(), StoreError>;

    async fn clear_targets(&self) -> Result<(), StoreError>;

    async fn clear_target(&self, name: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl TargetsRepo for PgStore {
    async fn target_overrides(&self) -> Result<BTreeMap<String, f64>, StoreError> {
        let rows = sqlx::query_as::<_, (String, f64)>("SELECT macro, value FROM targets")
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn set_targets(&self, values: &BTreeMap<String, f64>) -> Result<(), StoreError> {
        let (names, amounts): (Vec<String>, Vec<f64>) =
            values.iter().map(|(k, v)| (k.clone(), *v)).unzip();
        sqlx::query(
            r#"
            INSERT INTO targets (macro, value)
            SELECT * FROM UNNEST($1::text[], $2::float8[])
            ON CONFLICT (macro) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(names)
        .bind(amounts)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn clear_targets(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM targets")
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn clear_target(&self, name: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM targets WHERE macro = $1")
            .bind(name)
            .execute(self.pool()?)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
