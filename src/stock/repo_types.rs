use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{catalog::Product, nutrition::Nutrition, types::Upc};

/// Point-in-time copy of catalog fields carried by a stock row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
}

impl From<&Product> for Snapshot {
    fn from(p: &Product) -> Self {
        Self {
            name: p.name.clone(),
            tags: p.tags.clone(),
            ingredients: p.ingredients.clone(),
            nutrition: p.nutrition.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRow {
    pub id: Uuid,
    pub upc: Upc,
    pub quantity: i64,
    #[serde(flatten)]
    pub snapshot: Snapshot,
    #[serde(skip)]
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One entry per UPC with quantity summed across its rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAggregate {
    pub upc: Upc,
    pub name: String,
    pub quantity: i64,
    pub rows: i64,
}

/// Journal entry for units taken out of stock without being eaten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removal {
    pub id: Uuid,
    pub upc: Upc,
    pub units: i64,
    pub reason: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct StockRecord {
    pub id: Uuid,
    pub seq: i64,
    pub upc: String,
    pub quantity: i64,
    pub name: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Json<Nutrition>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<StockRecord> for StockRow {
    fn from(r: StockRecord) -> Self {
        Self {
            id: r.id,
            upc: Upc::from_stored(r.upc),
            quantity: r.quantity,
            snapshot: Snapshot {
                name: r.name,
                tags: r.tags,
                ingredients: r.ingredients,
                nutrition: r.nutrition.0,
            },
            seq: r.seq,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AggregateRecord {
    pub upc: String,
    pub name: String,
    pub quantity: i64,
    pub rows: i64,
}

impl From<AggregateRecord> for StockAggregate {
    fn from(r: AggregateRecord) -> Self {
        Self {
            upc: Upc::from_stored(r.upc),
            name: r.name,
            quantity: r.quantity,
            rows: r.rows,
        }
    }
}
