use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{nutrition::Nutrition, types::Upc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Written by a stock consume.
    Consume,
    /// Appended directly, independent of stock.
    Manual,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Consume => "consume",
            EntrySource::Manual => "manual",
        }
    }

    fn from_stored(s: &str) -> Self {
        match s {
            "consume" => EntrySource::Consume,
            _ => EntrySource::Manual,
        }
    }
}

/// One consumption record. `nutrition` is the whole contribution (per-unit values × units).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub upc: Upc,
    pub units: f64,
    pub nutrition: Nutrition,
    pub source: EntrySource,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub deleted: bool,
    #[serde(skip)]
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub upc: Upc,
    pub units: f64,
    pub nutrition: Nutrition,
    pub source: EntrySource,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct LogRecord {
    pub id: Uuid,
    pub seq: i64,
    pub upc: String,
    pub units: f64,
    pub nutrition: Json<Nutrition>,
    pub source: String,
    pub logged_at: OffsetDateTime,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
}

impl From<LogRecord> for LogEntry {
    fn from(r: LogRecord) -> Self {
        Self {
            id: r.id,
            upc: Upc::from_stored(r.upc),
            units: r.units,
            nutrition: r.nutrition.0,
            source: EntrySource::from_stored(&r.source),
            timestamp: r.logged_at,
            deleted: r.deleted,
            seq: r.seq,
            created_at: r.created_at,
        }
    }
}
