use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use super::repo_types::{EntrySource, LogEntry, NewLogEntry};
use crate::{
    db::{CatalogRepo, LogRepo, StockRepo, Store},
    error::FoodError,
    nutrition::Nutrition,
    targets::Targets,
    types::Upc,
};

/// A UTC calendar day of the log with totals and what is left of each target.
#[derive(Debug, Clone, Serialize)]
pub struct DayLog {
    pub date: String,
    pub entries: Vec<LogEntry>,
    pub totals: Nutrition,
    /// May go negative once a target is exceeded.
    pub remaining: BTreeMap<String, f64>,
}

pub fn parse_day(raw: &str) -> Result<Date, FoodError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| FoodError::validation(format!("date must be YYYY-MM-DD, got {raw:?}")))
}

fn format_day(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Nutrition log: dated consumption entries with soft delete.
#[derive(Clone)]
pub struct NutritionLog {
    store: Arc<dyn Store>,
    targets: Targets,
}

impl NutritionLog {
    pub fn new(store: Arc<dyn Store>, targets: Targets) -> Self {
        Self { store, targets }
    }

    /// Catalog facts win; a UPC only known to stock falls back to its newest row's snapshot.
    async fn per_unit(&self, upc: &Upc) -> Result<Nutrition, FoodError> {
        if let Some(product) = self.store.product_by_upc(upc).await? {
            return Ok(product.nutrition);
        }
        let rows = self.store.stock_rows_for(upc).await?;
        rows.into_iter()
            .last()
            .map(|row| row.snapshot.nutrition)
            .ok_or_else(|| FoodError::not_found(format!("UPC {upc}")))
    }

    /// Manual entry; does not touch stock quantities.
    pub async fn append(
        &self,
        upc: &Upc,
        units: f64,
        timestamp: Option<OffsetDateTime>,
    ) -> Result<LogEntry, FoodError> {
        if !units.is_finite() || units <= 0.0 {
            return Err(FoodError::validation("units must be a positive number"));
        }
        let per_unit = self.per_unit(upc).await?;
        let entry = self
            .store
            .insert_log_entry(&NewLogEntry {
                upc: upc.clone(),
                units,
                nutrition: per_unit.scaled(units),
                source: EntrySource::Manual,
                timestamp: timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            })
            .await?;
        info!(upc = %upc, id = %entry.id, units, "log entry appended");
        Ok(entry)
    }

    /// Entry for units already taken out of stock; `nutrition` is the total contribution.
    pub(crate) async fn record_consumption(
        &self,
        upc: &Upc,
        units: i64,
        nutrition: Nutrition,
    ) -> Result<LogEntry, FoodError> {
        let entry = self
            .store
            .insert_log_entry(&NewLogEntry {
                upc: upc.clone(),
                units: units as f64,
                nutrition,
                source: EntrySource::Consume,
                timestamp: OffsetDateTime::now_utc(),
            })
            .await?;
        Ok(entry)
    }

    pub async fn day(&self, date: Date) -> Result<DayLog, FoodError> {
        let from = date.midnight().assume_utc();
        // the last representable day has no following midnight
        let to = date.next_day().map(|d| d.midnight().assume_utc());
        let entries = self.store.log_entries_between(from, to).await?;
        let targets = self.targets.get().await?;

        let mut totals: Nutrition = targets.keys().map(|k| (k.clone(), 0.0)).collect();
        for entry in &entries {
            totals.accumulate(&entry.nutrition);
        }
        let remaining = targets
            .iter()
            .map(|(k, target)| (k.clone(), target - totals.get(k).unwrap_or(0.0)))
            .collect();

        debug!(date = %date, entries = entries.len(), "day log computed");
        Ok(DayLog {
            date: format_day(date),
            entries,
            totals,
            remaining,
        })
    }

    /// Returns whether this call deleted the entry; repeating it is still a success.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, FoodError> {
        match self.store.soft_delete_log_entry(id).await? {
            Some(changed) => {
                if changed {
                    info!(id = %id, "log entry deleted");
                }
                Ok(changed)
            }
            None => Err(FoodError::not_found(format!("log entry {id}"))),
        }
    }

    pub async fn undo(&self) -> Result<LogEntry, FoodError> {
        let entry = self
            .store
            .undo_last_log_entry()
            .await?
            .ok_or_else(|| FoodError::not_found("log entry to undo"))?;
        info!(id = %entry.id, upc = %entry.upc, "last log entry undone");
        Ok(entry)
    }
}
