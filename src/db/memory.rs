use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::{
    catalog::{
        repo::CatalogRepo,
        repo_types::{NewProduct, Product, ProductFilter, References},
    },
    log::{
        repo::LogRepo,
        repo_types::{LogEntry, NewLogEntry},
    },
    stock::{
        repo::StockRepo,
        repo_types::{Removal, Snapshot, StockAggregate, StockRow},
    },
    targets::repo::TargetsRepo,
    types::Upc,
};

#[derive(Default)]
struct Inner {
    seq: i64,
    products: Vec<Product>,
    stock: Vec<StockRow>,
    removals: Vec<Removal>,
    log: Vec<LogEntry>,
    targets: BTreeMap<String, f64>,
    /// Successful decrements left before every further one reports the row as drained.
    decrement_budget: Option<usize>,
}

impl Inner {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }
}

#[derive(Default)]
struct Faults {
    log_writes: AtomicBool,
    removal_writes: AtomicBool,
    restores: AtomicBool,
}

fn overflow(id: Uuid) -> StoreError {
    StoreError::OutOfRange(format!("quantity of stock row {id} would exceed the maximum"))
}

/// In-process store with the same guarantees as the database: unique UPCs, versioned
/// product replacement, conditional decrements and insertion-order sequence numbers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following log insert fail, to exercise the "decremented but not logged" path.
    pub fn set_log_writes_failing(&self, failing: bool) {
        self.faults.log_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_removal_writes_failing(&self, failing: bool) {
        self.faults.removal_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_restores_failing(&self, failing: bool) {
        self.faults.restores.store(failing, Ordering::SeqCst);
    }

    /// After `n` more successful decrements every conditional decrement fails, as if other
    /// callers had drained the rows in between.
    pub fn limit_decrements(&self, n: usize) {
        self.lock().decrement_budget = Some(n);
    }

    pub fn removals(&self) -> Vec<Removal> {
        self.lock().removals.clone()
    }
}

#[async_trait]
impl CatalogRepo for MemoryStore {
    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.lock();
        if let Some(upc) = &new.upc {
            if inner.products.iter().any(|p| p.upc.as_ref() == Some(upc)) {
                return Err(StoreError::Conflict(format!("duplicate upc {upc}")));
            }
        }
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: Uuid::new_v4(),
            upc: new.upc.clone(),
            name: new.name.clone(),
            tags: new.tags.clone(),
            ingredients: new.ingredients.clone(),
            nutrition: new.nutrition.clone(),
            version: 0,
            seq: inner.next_seq(),
            created_at: now,
            updated_at: now,
        };
        inner.products.push(product.clone());
        Ok(product)
    }

    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn product_by_upc(&self, upc: &Upc) -> Result<Option<Product>, StoreError> {
        Ok(self
            .lock()
            .products
            .iter()
            .find(|p| p.upc.as_ref() == Some(upc))
            .cloned())
    }

    async fn replace_product(&self, product: &Product) -> Result<Option<Product>, StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner
            .products
            .iter_mut()
            .find(|p| p.id == product.id && p.version == product.version)
        else {
            return Ok(None);
        };
        stored.name = product.name.clone();
        stored.tags = product.tags.clone();
        stored.ingredients = product.ingredients.clone();
        stored.nutrition = product.nutrition.clone();
        stored.version += 1;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(Some(stored.clone()))
    }

    fn search_products(&self, filter: ProductFilter) -> BoxStream<'_, Result<Product, StoreError>> {
        let hits: Vec<Product> = self
            .lock()
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        futures::stream::iter(hits.into_iter().map(Ok)).boxed()
    }

    async fn product_references(&self, upc: &Upc) -> Result<References, StoreError> {
        let inner = self.lock();
        Ok(References {
            stock_rows: inner.stock.iter().filter(|r| &r.upc == upc).count() as i64,
            log_entries: inner
                .log
                .iter()
                .filter(|e| !e.deleted && &e.upc == upc)
                .count() as i64,
        })
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.products.len();
        inner.products.retain(|p| p.id != id);
        Ok(inner.products.len() < before)
    }
}

#[async_trait]
impl StockRepo for MemoryStore {
    async fn insert_stock_row(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<StockRow, StoreError> {
        let mut inner = self.lock();
        let now = OffsetDateTime::now_utc();
        let row = StockRow {
            id: Uuid::new_v4(),
            upc: upc.clone(),
            quantity,
            snapshot: snapshot.clone(),
            seq: inner.next_seq(),
            created_at: now,
            updated_at: now,
        };
        inner.stock.push(row.clone());
        Ok(row)
    }

    async fn replenish_oldest(
        &self,
        upc: &Upc,
        quantity: i64,
        snapshot: &Snapshot,
    ) -> Result<Option<StockRow>, StoreError> {
        let mut inner = self.lock();
        let Some(row) = inner
            .stock
            .iter_mut()
            .find(|r| &r.upc == upc && r.quantity > 0)
        else {
            return Ok(None);
        };
        row.quantity = row.quantity.checked_add(quantity).ok_or_else(|| overflow(row.id))?;
        row.snapshot = snapshot.clone();
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn stock_row(&self, id: Uuid) -> Result<Option<StockRow>, StoreError> {
        Ok(self.lock().stock.iter().find(|r| r.id == id).cloned())
    }

    async fn stock_rows_for(&self, upc: &Upc) -> Result<Vec<StockRow>, StoreError> {
        Ok(self
            .lock()
            .stock
            .iter()
            .filter(|r| &r.upc == upc)
            .cloned()
            .collect())
    }

    async fn list_stock_rows(&self) -> Result<Vec<StockRow>, StoreError> {
        Ok(self.lock().stock.clone())
    }

    async fn stock_aggregates(&self) -> Result<Vec<StockAggregate>, StoreError> {
        let inner = self.lock();
        let mut out: Vec<StockAggregate> = Vec::new();
        for row in &inner.stock {
            match out.iter_mut().find(|a| a.upc == row.upc) {
                Some(agg) => {
                    agg.quantity = agg.quantity.saturating_add(row.quantity);
                    agg.rows += 1;
                    agg.name = row.snapshot.name.clone();
                }
                None => out.push(StockAggregate {
                    upc: row.upc.clone(),
                    name: row.snapshot.name.clone(),
                    quantity: row.quantity,
                    rows: 1,
                }),
            }
        }
        Ok(out)
    }

    async fn stock_available(&self, upc: &Upc) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .stock
            .iter()
            .filter(|r| &r.upc == upc)
            .fold(0i64, |sum, r| sum.saturating_add(r.quantity)))
    }

    async fn decrement_if_available(&self, id: Uuid, units: i64) -> Result<Option<i64>, StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.decrement_budget == Some(0) {
            return Ok(None);
        }
        let Some(row) = inner
            .stock
            .iter_mut()
            .find(|r| r.id == id && r.quantity >= units)
        else {
            return Ok(None);
        };
        row.quantity -= units;
        row.updated_at = OffsetDateTime::now_utc();
        if let Some(left) = inner.decrement_budget.as_mut() {
            *left -= 1;
        }
        Ok(Some(row.quantity))
    }

    async fn restore_stock(&self, id: Uuid, units: i64) -> Result<bool, StoreError> {
        if self.faults.restores.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("stock restores are failing".into()));
        }
        let mut inner = self.lock();
        let Some(row) = inner.stock.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        row.quantity = row.quantity.checked_add(units).ok_or_else(|| overflow(id))?;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn delete_stock_row(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.stock.len();
        inner.stock.retain(|r| r.id != id);
        Ok(inner.stock.len() < before)
    }

    async fn record_removal(&self, removal: &Removal) -> Result<(), StoreError> {
        if self.faults.removal_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("removal journal writes are failing".into()));
        }
        self.lock().removals.push(removal.clone());
        Ok(())
    }
}

#[async_trait]
impl LogRepo for MemoryStore {
    async fn insert_log_entry(&self, new: &NewLogEntry) -> Result<LogEntry, StoreError> {
        if self.faults.log_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("log writes are failing".into()));
        }
        let mut inner = self.lock();
        let entry = LogEntry {
            id: Uuid::new_v4(),
            upc: new.upc.clone(),
            units: new.units,
            nutrition: new.nutrition.clone(),
            source: new.source,
            timestamp: new.timestamp,
            deleted: false,
            seq: inner.next_seq(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.log.push(entry.clone());
        Ok(entry)
    }

    async fn log_entries_between(
        &self,
        from: OffsetDateTime,
        to: Option<OffsetDateTime>,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let mut entries: Vec<LogEntry> = self
            .lock()
            .log
            .iter()
            .filter(|e| !e.deleted && e.timestamp >= from && to.map_or(true, |to| e.timestamp < to))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.timestamp, e.seq));
        Ok(entries)
    }

    async fn soft_delete_log_entry(&self, id: Uuid) -> Result<Option<bool>, StoreError> {
        let mut inner = self.lock();
        Ok(inner.log.iter_mut().find(|e| e.id == id).map(|e| {
            let changed = !e.deleted;
            e.deleted = true;
            changed
        }))
    }

    async fn undo_last_log_entry(&self) -> Result<Option<LogEntry>, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .log
            .iter_mut()
            .filter(|e| !e.deleted)
            .max_by_key(|e| e.seq)
            .map(|e| {
                e.deleted = true;
                e.clone()
            }))
    }
}

#[async_trait]
impl TargetsRepo for MemoryStore {
    async fn target_overrides(&self) -> Result<BTreeMap<String, f64>, StoreError> {
        Ok(self.lock().targets.clone())
    }

    async fn set_targets(&self, values: &BTreeMap<String, f64>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for (k, v) in values {
            inner.targets.insert(k.clone(), *v);
        }
        Ok(())
    }

    async fn clear_targets(&self) -> Result<(), StoreError> {
        self.lock().targets.clear();
        Ok(())
    }

    async fn clear_target(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.lock().targets.remove(name).is_some())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
