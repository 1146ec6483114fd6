use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{nutrition::Nutrition, types::Upc};

/// Catalog entry; the source of truth for product identity and current nutrition facts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upc: Option<Upc>,
    pub name: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
    #[serde(skip)]
    pub version: i64,
    #[serde(skip)]
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub upc: Option<Upc>,
    pub name: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
}

/// Search filters; every filter that is set must match.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive substring over name, upc, tags and ingredients.
    pub q: Option<String>,
    /// Exact UPC.
    pub upc: Option<String>,
    /// Case-insensitive tag membership.
    pub tag: Option<String>,
}

impl ProductFilter {
    pub fn new(q: Option<String>, upc: Option<String>, tag: Option<String>) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        Self {
            q: clean(q),
            upc: clean(upc),
            tag: clean(tag),
        }
    }

    pub fn matches(&self, p: &Product) -> bool {
        let upc = p.upc.as_ref().map(Upc::as_str);
        if let Some(wanted) = &self.upc {
            if upc != Some(wanted.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            let tag = tag.to_lowercase();
            if !p.tags.iter().any(|t| t.to_lowercase() == tag) {
                return false;
            }
        }
        if let Some(q) = &self.q {
            let q = q.to_lowercase();
            let hit = |s: &str| s.to_lowercase().contains(&q);
            return hit(&p.name)
                || upc.is_some_and(hit)
                || p.tags.iter().any(|t| hit(t))
                || p.ingredients.iter().any(|i| hit(i));
        }
        true
    }
}

/// How many stock rows and live log entries still point at a UPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct References {
    pub stock_rows: i64,
    pub log_entries: i64,
}

impl References {
    pub fn any(&self) -> bool {
        self.stock_rows > 0 || self.log_entries > 0
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRecord {
    pub id: Uuid,
    pub seq: i64,
    pub upc: Option<String>,
    pub name: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Json<Nutrition>,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<ProductRecord> for Product {
    fn from(r: ProductRecord) -> Self {
        Self {
            id: r.id,
            upc: r.upc.map(Upc::from_stored),
            name: r.name,
            tags: r.tags,
            ingredients: r.ingredients,
            nutrition: r.nutrition.0,
            version: r.version,
            seq: r.seq,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
