use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use sqlx::types::Json;
use uuid::Uuid;

use super::repo_types::{NewProduct, Product, ProductFilter, ProductRecord, References};
use crate::{
    db::{PgStore, StoreError},
    types::Upc,
};

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Fails with `StoreError::Conflict` when the UPC is already taken.
    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError>;

    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn product_by_upc(&self, upc: &Upc) -> Result<Option<Product>, StoreError>;

    /// Stores `product` only while the stored version still equals `product.version`.
    /// Returns `None` when the check fails or the product is gone.
    async fn replace_product(&self, product: &Product) -> Result<Option<Product>, StoreError>;

    /// Lazy cursor over matching products in insertion order.
    fn search_products(&self, filter: ProductFilter) -> BoxStream<'_, Result<Product, StoreError>>;

    async fn product_references(&self, upc: &Upc) -> Result<References, StoreError>;

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError>;
}

const PRODUCT_COLUMNS: &str =
    "id, seq, upc, name, tags, ingredients, nutrition, version, created_at, updated_at";

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('%');
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl CatalogRepo for PgStore {
    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRecord>(&format!(
            r#"
            INSERT INTO products (id, upc, name, tags, ingredients, nutrition)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.upc.as_ref().map(|u| u.as_str().to_owned()))
        .bind(&new.name)
        .bind(new.tags.clone())
        .bind(new.ingredients.clone())
        .bind(Json(new.nutrition.clone()))
        .fetch_one(self.pool()?)
        .await?;
        Ok(row.into())
    }

    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn product_by_upc(&self, upc: &Upc) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE upc = $1"
        ))
        .bind(upc.as_str())
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn replace_product(&self, product: &Product) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRecord>(&format!(
            r#"
            UPDATE products
               SET name = $3, tags = $4, ingredients = $5, nutrition = $6,
                   version = version + 1, updated_at = now()
             WHERE id = $1 AND version = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id)
        .bind(product.version)
        .bind(&product.name)
        .bind(product.tags.clone())
        .bind(product.ingredients.clone())
        .bind(Json(product.nutrition.clone()))
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(Into::into))
    }

    fn search_products(&self, filter: ProductFilter) -> BoxStream<'_, Result<Product, StoreError>> {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };
        sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, seq, upc, name, tags, ingredients, nutrition, version, created_at, updated_at
              FROM products
             WHERE ($1::text IS NULL
                    OR name ILIKE $1 ESCAPE '\'
                    OR upc ILIKE $1 ESCAPE '\'
                    OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE t ILIKE $1 ESCAPE '\')
                    OR EXISTS (SELECT 1 FROM unnest(ingredients) i WHERE i ILIKE $1 ESCAPE '\'))
               AND ($2::text IS NULL OR upc = $2)
               AND ($3::text IS NULL
                    OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE lower(t) = lower($3)))
             ORDER BY seq
            "#,
        )
        .bind(filter.q.as_deref().map(escape_like))
        .bind(filter.upc)
        .bind(filter.tag)
        .fetch(pool)
        .map(|row| row.map(Product::from).map_err(StoreError::from))
        .boxed()
    }

    async fn product_references(&self, upc: &Upc) -> Result<References, StoreError> {
        let (stock_rows, log_entries) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (SELECT COUNT(*) FROM stock WHERE upc = $1),
                   (SELECT COUNT(*) FROM food_log WHERE upc = $1 AND NOT deleted)
            "#,
        )
        .bind(upc.as_str())
        .fetch_one(self.pool()?)
        .await?;
        Ok(References {
            stock_rows,
            log_entries,
        })
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool()?)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
