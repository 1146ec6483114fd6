use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    dto::StockItem,
    repo_types::{Removal, Snapshot, StockAggregate, StockRow},
};
use crate::{
    catalog::{services::clean_name, Catalog, ProductSeed},
    db::{StockRepo, Store},
    error::FoodError,
    log::{LogEntry, NutritionLog},
    lookup::ProductLookup,
    nutrition::Nutrition,
    types::Upc,
};

/// Conditional decrements tried against one row before moving on to the next.
const MAX_ROW_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockView {
    #[default]
    Aggregate,
    Items,
}

impl StockView {
    pub fn parse(raw: Option<&str>) -> Result<Self, FoodError> {
        match raw.map(str::trim) {
            None | Some("") | Some("aggregate") => Ok(StockView::Aggregate),
            Some("items") => Ok(StockView::Items),
            Some(other) => Err(FoodError::validation(format!(
                "view must be aggregate or items, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StockListing {
    Aggregate(Vec<StockAggregate>),
    Items(Vec<StockRow>),
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub ids: Vec<Uuid>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeOutcome {
    pub upc: Upc,
    pub units: i64,
    /// `None` when the level could not be re-read after the write.
    pub remaining: Option<i64>,
    pub rows: Vec<Uuid>,
    pub entry: LogEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    pub upc: Upc,
    pub units: i64,
    pub remaining: Option<i64>,
    pub rows: Vec<Uuid>,
    pub removal: Removal,
}

struct ValidItem {
    upc: Upc,
    quantity: i64,
    seed: ProductSeed,
}

fn validate_item(item: StockItem) -> Result<ValidItem, FoodError> {
    if item.quantity <= 0 {
        return Err(FoodError::validation(format!(
            "quantity for UPC {} must be a positive integer",
            item.upc
        )));
    }
    let name = item.name.as_deref().map(clean_name).transpose()?;
    let nutrition = match item.nutrition {
        Some(input) => Nutrition::from_input(input)?,
        None => Nutrition::default(),
    };
    Ok(ValidItem {
        upc: item.upc,
        quantity: item.quantity,
        seed: ProductSeed {
            name,
            tags: item.tags.map(|t| t.into_vec()).unwrap_or_default(),
            ingredients: item.ingredients.map(|t| t.into_vec()).unwrap_or_default(),
            nutrition,
        },
    })
}

fn check_units(units: i64) -> Result<(), FoodError> {
    if units <= 0 {
        return Err(FoodError::validation("units must be a positive integer"));
    }
    Ok(())
}

/// Units taken from one row, with the row's per-unit nutrition at that moment.
struct Taken {
    row: Uuid,
    units: i64,
    per_unit: Nutrition,
}

/// Stock ledger: quantity rows per UPC with catalog-synced snapshots.
#[derive(Clone)]
pub struct Stock {
    store: Arc<dyn Store>,
    catalog: Catalog,
    log: NutritionLog,
    lookup: Arc<dyn ProductLookup>,
}

impl Stock {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Catalog,
        log: NutritionLog,
        lookup: Arc<dyn ProductLookup>,
    ) -> Self {
        Self {
            store,
            catalog,
            log,
            lookup,
        }
    }

    /// Every item is validated before anything is written. A UPC that already holds stock is
    /// replenished on its oldest undepleted row; otherwise a new row is opened.
    pub async fn add(&self, items: Vec<StockItem>) -> Result<AddOutcome, FoodError> {
        if items.is_empty() {
            return Err(FoodError::validation("items must not be empty"));
        }
        let items = items
            .into_iter()
            .map(validate_item)
            .collect::<Result<Vec<_>, _>>()?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let row = self.add_one(item).await?;
            if !ids.contains(&row.id) {
                ids.push(row.id);
            }
        }
        Ok(AddOutcome {
            count: ids.len(),
            ids,
        })
    }

    async fn add_one(&self, item: ValidItem) -> Result<StockRow, FoodError> {
        let seed = self.resolve_seed(&item.upc, item.seed).await?;
        let product = self.catalog.sync_seed(&item.upc, &seed).await?;
        let snapshot = Snapshot::from(&product);

        if let Some(row) = self
            .store
            .replenish_oldest(&item.upc, item.quantity, &snapshot)
            .await?
        {
            info!(upc = %item.upc, row = %row.id, added = item.quantity, quantity = row.quantity, "stock replenished");
            return Ok(row);
        }
        let row = self
            .store
            .insert_stock_row(&item.upc, item.quantity, &snapshot)
            .await?;
        info!(upc = %item.upc, row = %row.id, quantity = row.quantity, "stock row opened");
        Ok(row)
    }

    /// Fills in identity from the external lookup when a new UPC arrives without a name.
    async fn resolve_seed(&self, upc: &Upc, seed: ProductSeed) -> Result<ProductSeed, FoodError> {
        if seed.name.is_some() || self.catalog.by_upc(upc).await?.is_some() {
            return Ok(seed);
        }
        match self.lookup.lookup(upc).await {
            Ok(Some(found)) => {
                info!(upc = %upc, name = ?found.name, "product identified by external lookup");
                Ok(seed.overlay(found))
            }
            Ok(None) => Ok(seed),
            Err(e) => {
                warn!(upc = %upc, error = %e, "product lookup failed; continuing without it");
                Ok(seed)
            }
        }
    }

    /// Takes `units` out of stock oldest row first. Either the whole amount is taken or
    /// every row touched is restored.
    async fn take(&self, upc: &Upc, units: i64) -> Result<Vec<Taken>, FoodError> {
        let rows = self.store.stock_rows_for(upc).await?;
        let available = rows.iter().fold(0i64, |sum, r| sum.saturating_add(r.quantity));
        if available < units {
            return Err(FoodError::InsufficientStock {
                upc: upc.to_string(),
                requested: units,
                available,
            });
        }

        let mut outstanding = units;
        let mut taken = Vec::new();
        for row in rows.iter().filter(|r| r.quantity > 0) {
            if outstanding == 0 {
                break;
            }
            match self.take_from_row(row, outstanding).await {
                Ok(Some(n)) => {
                    outstanding -= n;
                    taken.push(Taken {
                        row: row.id,
                        units: n,
                        per_unit: row.snapshot.nutrition.clone(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    self.compensate(upc, &taken).await?;
                    return Err(e);
                }
            }
        }

        if outstanding > 0 {
            self.compensate(upc, &taken).await?;
            debug!(upc = %upc, units, outstanding, "lost a race for stock; decrement undone");
            return Err(FoodError::InsufficientStock {
                upc: upc.to_string(),
                requested: units,
                available: units - outstanding,
            });
        }
        Ok(taken)
    }

    /// Conditional decrement of up to `wanted` units, re-reading the row when another
    /// caller got there first.
    async fn take_from_row(&self, row: &StockRow, wanted: i64) -> Result<Option<i64>, FoodError> {
        let mut on_hand = row.quantity;
        for _ in 0..MAX_ROW_ATTEMPTS {
            let n = wanted.min(on_hand);
            if n <= 0 {
                return Ok(None);
            }
            if self.store.decrement_if_available(row.id, n).await?.is_some() {
                return Ok(Some(n));
            }
            match self.store.stock_row(row.id).await? {
                Some(fresh) => on_hand = fresh.quantity,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    async fn compensate(&self, upc: &Upc, taken: &[Taken]) -> Result<(), FoodError> {
        let mut lost = 0;
        for t in taken {
            match self.store.restore_stock(t.row, t.units).await {
                Ok(true) => {}
                Ok(false) => lost += t.units,
                Err(e) => {
                    error!(upc = %upc, row = %t.row, units = t.units, error = %e, "failed to restore stock");
                    lost += t.units;
                }
            }
        }
        if lost > 0 {
            error!(upc = %upc, lost, "stock rollback incomplete");
            return Err(FoodError::PartiallyApplied {
                detail: format!("{lost} unit(s) of UPC {upc} could not be restored after a failed decrement"),
            });
        }
        Ok(())
    }

    async fn remaining(&self, upc: &Upc) -> Option<i64> {
        match self.store.stock_available(upc).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(upc = %upc, error = %e, "could not re-read stock level");
                None
            }
        }
    }

    /// Decrements stock and logs the nutrition of exactly the units taken.
    pub async fn consume(&self, upc: &Upc, units: i64) -> Result<ConsumeOutcome, FoodError> {
        check_units(units)?;
        let taken = self.take(upc, units).await?;

        let mut nutrition = Nutrition::default();
        for t in &taken {
            nutrition.accumulate(&t.per_unit.scaled(t.units as f64));
        }
        let rows: Vec<Uuid> = taken.iter().map(|t| t.row).collect();

        let entry = match self.log.record_consumption(upc, units, nutrition).await {
            Ok(entry) => entry,
            Err(e) => {
                error!(upc = %upc, units, error = %e, "stock decremented but log entry not written");
                return Err(FoodError::PartiallyApplied {
                    detail: format!(
                        "stock for UPC {upc} was decremented by {units} but the log entry could not be written: {e}"
                    ),
                });
            }
        };
        info!(upc = %upc, units, entry = %entry.id, "stock consumed");
        Ok(ConsumeOutcome {
            upc: upc.clone(),
            units,
            remaining: self.remaining(upc).await,
            rows,
            entry,
        })
    }

    /// Decrements stock without logging; the reason goes to the removal journal.
    pub async fn remove(
        &self,
        upc: &Upc,
        units: i64,
        reason: Option<&str>,
    ) -> Result<RemoveOutcome, FoodError> {
        check_units(units)?;
        let reason = reason.map(str::trim).unwrap_or("");
        if reason.is_empty() {
            return Err(FoodError::validation("reason is required to remove stock"));
        }
        let taken = self.take(upc, units).await?;
        let rows: Vec<Uuid> = taken.iter().map(|t| t.row).collect();

        let removal = Removal {
            id: Uuid::new_v4(),
            upc: upc.clone(),
            units,
            reason: reason.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
        };
        if let Err(e) = self.store.record_removal(&removal).await {
            error!(upc = %upc, units, error = %e, "stock decremented but removal not journaled");
            return Err(FoodError::PartiallyApplied {
                detail: format!(
                    "stock for UPC {upc} was decremented by {units} but the removal could not be recorded: {e}"
                ),
            });
        }
        info!(upc = %upc, units, reason = %removal.reason, "stock removed");
        Ok(RemoveOutcome {
            upc: upc.clone(),
            units,
            remaining: self.remaining(upc).await,
            rows,
            removal,
        })
    }

    pub async fn list(&self, view: StockView) -> Result<StockListing, FoodError> {
        Ok(match view {
            StockView::Aggregate => StockListing::Aggregate(self.store.stock_aggregates().await?),
            StockView::Items => StockListing::Items(self.store.list_stock_rows().await?),
        })
    }

    /// Leaves the catalog untouched.
    pub async fn delete_row(&self, id: Uuid) -> Result<(), FoodError> {
        if !self.store.delete_stock_row(id).await? {
            return Err(FoodError::not_found(format!("stock row {id}")));
        }
        info!(row = %id, "stock row deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::dto::ProductPatch,
        db::MemoryStore,
        lookup::NoLookup,
        stock::dto::AddRequest,
        targets::Targets,
        types::from_json,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        store: Arc<MemoryStore>,
        catalog: Catalog,
        log: NutritionLog,
        stock: Stock,
    }

    fn fixture_with(lookup: Arc<dyn ProductLookup>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let catalog = Catalog::new(dyn_store.clone());
        let log = NutritionLog::new(dyn_store.clone(), Targets::new(dyn_store.clone()));
        let stock = Stock::new(dyn_store, catalog.clone(), log.clone(), lookup);
        Fixture {
            store,
            catalog,
            log,
            stock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NoLookup))
    }

    fn items(body: serde_json::Value) -> Vec<StockItem> {
        from_json::<AddRequest>(json!({ "items": body }))
            .unwrap()
            .items
    }

    fn upc(s: &str) -> Upc {
        Upc::parse(s).unwrap()
    }

    async fn stocked(f: &Fixture, code: &str, quantity: i64, calories: f64) {
        f.stock
            .add(items(json!([{
                "upc": code,
                "quantity": quantity,
                "name": "Apple",
                "nutrition": { "calories": calories }
            }])))
            .await
            .unwrap();
    }

    async fn open_row(f: &Fixture, code: &str, quantity: i64) -> StockRow {
        let snapshot = Snapshot {
            name: "Rice".into(),
            tags: vec![],
            ingredients: vec![],
            nutrition: [("calories".to_string(), 10.0)].into_iter().collect(),
        };
        f.store
            .insert_stock_row(&upc(code), quantity, &snapshot)
            .await
            .unwrap()
    }

    struct FixedLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProductLookup for FixedLookup {
        async fn lookup(&self, _upc: &Upc) -> anyhow::Result<Option<ProductSeed>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ProductSeed {
                name: Some("Looked Up Soda".into()),
                tags: vec!["beverages".into()],
                ingredients: vec![],
                nutrition: [("calories".to_string(), 140.0)].into_iter().collect(),
            }))
        }
    }

    struct BrokenLookup;

    #[async_trait]
    impl ProductLookup for BrokenLookup {
        async fn lookup(&self, _upc: &Upc) -> anyhow::Result<Option<ProductSeed>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn add_unions_into_existing_catalog_entry() {
        let f = fixture();
        let patch: ProductPatch = from_json(json!({
            "upc": "100", "name": "Crisps", "tags": ["b"],
            "nutrition": { "calories": 150, "fat": 10 }
        }))
        .unwrap();
        f.catalog.upsert(patch).await.unwrap();

        f.stock
            .add(items(json!([{ "upc": "100", "quantity": 2, "tags": ["a"], "nutrition": { "calories": 160 } }])))
            .await
            .unwrap();

        let p = f.catalog.by_upc(&upc("100")).await.unwrap().unwrap();
        assert_eq!(p.tags, vec!["b", "a"]);
        assert_eq!(p.nutrition.get("calories"), Some(160.0));
        assert_eq!(p.nutrition.get("fat"), Some(10.0));

        let rows = f.store.stock_rows_for(&upc("100")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].snapshot.tags, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn add_validates_every_item_before_writing() {
        let f = fixture();
        let err = f
            .stock
            .add(items(json!([
                { "upc": "200", "quantity": 1, "name": "Ok" },
                { "upc": "201", "quantity": 0, "name": "Bad" }
            ])))
            .await
            .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
        assert!(f.catalog.by_upc(&upc("200")).await.unwrap().is_none());

        let err = from_json::<AddRequest>(
            json!({ "items": [{ "upc": 200, "quantity": 1 }] }),
        )
        .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
    }

    #[tokio::test]
    async fn add_replenishes_undepleted_row_and_opens_new_after_depletion() {
        let f = fixture();
        stocked(&f, "300", 2, 95.0).await;
        stocked(&f, "300", 3, 95.0).await;
        let rows = f.store.stock_rows_for(&upc("300")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, 5);

        f.stock.consume(&upc("300"), 5).await.unwrap();
        stocked(&f, "300", 1, 95.0).await;
        let rows = f.store.stock_rows_for(&upc("300")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].quantity, 0);
        assert_eq!(rows[1].quantity, 1);
    }

    #[tokio::test]
    async fn new_upc_without_name_uses_lookup() {
        let lookup = Arc::new(FixedLookup {
            calls: AtomicUsize::new(0),
        });
        let f = fixture_with(lookup.clone());
        f.stock
            .add(items(json!([{ "upc": "400", "quantity": 1, "tags": "fizzy" }])))
            .await
            .unwrap();
        let p = f.catalog.by_upc(&upc("400")).await.unwrap().unwrap();
        assert_eq!(p.name, "Looked Up Soda");
        assert_eq!(p.tags, vec!["fizzy", "beverages"]);
        assert_eq!(p.nutrition.get("calories"), Some(140.0));

        f.stock
            .add(items(json!([{ "upc": "400", "quantity": 1 }])))
            .await
            .unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lookup_leaves_name_required() {
        let f = fixture_with(Arc::new(BrokenLookup));
        let err = f
            .stock
            .add(items(json!([{ "upc": "401", "quantity": 1 }])))
            .await
            .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
    }

    #[tokio::test]
    async fn consume_is_fifo_and_logs_snapshot_nutrition() {
        let f = fixture();
        stocked(&f, "500", 2, 100.0).await;
        f.stock.consume(&upc("500"), 2).await.unwrap();
        stocked(&f, "500", 3, 120.0).await;

        let out = f.stock.consume(&upc("500"), 1).await.unwrap();
        assert_eq!(out.remaining, Some(2));
        assert_eq!(out.entry.nutrition.get("calories"), Some(120.0));

        // put one unit back on the older row
        let rows = f.store.stock_rows_for(&upc("500")).await.unwrap();
        f.store.restore_stock(rows[0].id, 1).await.unwrap();
        let out = f.stock.consume(&upc("500"), 2).await.unwrap();
        assert_eq!(out.rows, vec![rows[0].id, rows[1].id]);
        assert_eq!(out.entry.nutrition.get("calories"), Some(100.0 + 120.0));
        assert_eq!(out.remaining, Some(1));
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let f = fixture();
        stocked(&f, "600", 2, 10.0).await;
        let err = f.stock.consume(&upc("600"), 3).await.unwrap_err();
        assert!(matches!(
            err,
            FoodError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(f.store.stock_available(&upc("600")).await.unwrap(), 2);

        let err = f.stock.consume(&upc("601"), 1).await.unwrap_err();
        assert!(matches!(err, FoodError::InsufficientStock { available: 0, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_oversell() {
        let f = fixture();
        stocked(&f, "700", 10, 1.0).await;
        stocked(&f, "700", 5, 1.0).await;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let stock = f.stock.clone();
            handles.push(tokio::spawn(async move {
                stock.consume(&upc("700"), 1).await.is_ok()
            }));
        }
        let mut succeeded = 0;
        for h in handles {
            if h.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 15);
        assert_eq!(f.store.stock_available(&upc("700")).await.unwrap(), 0);
        let today = OffsetDateTime::now_utc().date();
        assert_eq!(f.log.day(today).await.unwrap().entries.len(), 15);
    }

    #[tokio::test]
    async fn failed_log_write_is_reported_as_partial() {
        let f = fixture();
        stocked(&f, "800", 3, 50.0).await;
        f.store.set_log_writes_failing(true);
        let err = f.stock.consume(&upc("800"), 2).await.unwrap_err();
        assert!(matches!(err, FoodError::PartiallyApplied { .. }));
        assert_eq!(f.store.stock_available(&upc("800")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lost_race_restores_every_row_touched() {
        let f = fixture();
        let first = open_row(&f, "810", 2).await;
        open_row(&f, "810", 3).await;
        // the first row is taken, then the second is drained by someone else
        f.store.limit_decrements(1);

        let err = f.stock.consume(&upc("810"), 4).await.unwrap_err();
        assert!(matches!(
            err,
            FoodError::InsufficientStock {
                requested: 4,
                available: 2,
                ..
            }
        ));
        let rows = f.store.stock_rows_for(&upc("810")).await.unwrap();
        assert_eq!(rows[0].id, first.id);
        assert_eq!(rows[0].quantity, 2);
        assert_eq!(f.store.stock_available(&upc("810")).await.unwrap(), 5);
        let today = OffsetDateTime::now_utc().date();
        assert!(f.log.day(today).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_is_reported_as_partial() {
        let f = fixture();
        open_row(&f, "820", 2).await;
        open_row(&f, "820", 3).await;
        f.store.limit_decrements(1);
        f.store.set_restores_failing(true);

        let err = f.stock.remove(&upc("820"), 4, Some("spoiled")).await.unwrap_err();
        assert!(matches!(err, FoodError::PartiallyApplied { .. }));
        assert_eq!(f.store.stock_available(&upc("820")).await.unwrap(), 3);
        assert!(f.store.removals().is_empty());
    }

    #[tokio::test]
    async fn failed_removal_journal_is_reported_as_partial() {
        let f = fixture();
        stocked(&f, "830", 3, 50.0).await;
        f.store.set_removal_writes_failing(true);

        let err = f.stock.remove(&upc("830"), 2, Some("dropped")).await.unwrap_err();
        assert!(matches!(err, FoodError::PartiallyApplied { .. }));
        assert_eq!(f.store.stock_available(&upc("830")).await.unwrap(), 1);
        assert!(f.store.removals().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_multi_unit_consumes_across_rows_add_up() {
        let f = fixture();
        for quantity in [7, 5, 9] {
            open_row(&f, "840", quantity).await;
        }
        let initial = f.store.stock_available(&upc("840")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..30 {
            let stock = f.stock.clone();
            let units = (i % 3) + 1;
            handles.push(tokio::spawn(async move {
                stock.consume(&upc("840"), units).await
            }));
        }
        let mut consumed = 0;
        let mut successes = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(out) => {
                    consumed += out.units;
                    successes += 1;
                }
                Err(FoodError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected consume failure: {other}"),
            }
        }

        assert!(consumed <= initial);
        assert_eq!(
            f.store.stock_available(&upc("840")).await.unwrap(),
            initial - consumed
        );
        for row in f.store.stock_rows_for(&upc("840")).await.unwrap() {
            assert!(row.quantity >= 0);
        }
        let today = OffsetDateTime::now_utc().date();
        assert_eq!(f.log.day(today).await.unwrap().entries.len(), successes);
    }

    #[tokio::test]
    async fn restock_past_the_maximum_is_rejected() {
        let f = fixture();
        stocked(&f, "850", i64::MAX, 1.0).await;
        let err = f
            .stock
            .add(items(json!([{ "upc": "850", "quantity": 1 }])))
            .await
            .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
        assert_eq!(f.store.stock_available(&upc("850")).await.unwrap(), i64::MAX);

        let out = f.stock.consume(&upc("850"), 1).await.unwrap();
        assert_eq!(out.remaining, Some(i64::MAX - 1));
    }

    #[tokio::test]
    async fn remove_needs_reason_and_skips_the_log() {
        let f = fixture();
        stocked(&f, "900", 3, 50.0).await;
        let err = f.stock.remove(&upc("900"), 1, Some("  ")).await.unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));

        let out = f.stock.remove(&upc("900"), 2, Some("expired")).await.unwrap();
        assert_eq!(out.remaining, Some(1));
        assert_eq!(out.removal.reason, "expired");
        assert_eq!(f.store.removals().len(), 1);
        let today = OffsetDateTime::now_utc().date();
        assert!(f.log.day(today).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn aggregate_view_sums_rows_per_upc() {
        let f = fixture();
        stocked(&f, "10", 2, 1.0).await;
        f.stock.consume(&upc("10"), 2).await.unwrap();
        stocked(&f, "10", 4, 1.0).await;
        stocked(&f, "11", 1, 1.0).await;

        let StockListing::Aggregate(agg) = f.stock.list(StockView::Aggregate).await.unwrap() else {
            panic!("expected aggregate view");
        };
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].upc.as_str(), "10");
        assert_eq!(agg[0].quantity, 4);
        assert_eq!(agg[0].rows, 2);

        let StockListing::Items(rows) = f.stock.list(StockView::Items).await.unwrap() else {
            panic!("expected items view");
        };
        assert_eq!(rows.len(), 3);
        assert!(StockView::parse(Some("grid")).is_err());
    }

    #[tokio::test]
    async fn delete_row_leaves_catalog_and_guards_product_delete() {
        let f = fixture();
        stocked(&f, "12", 1, 1.0).await;
        let product = f.catalog.by_upc(&upc("12")).await.unwrap().unwrap();

        let err = f.catalog.delete(product.id, false).await.unwrap_err();
        assert!(matches!(err, FoodError::Reference(_)));

        let row = f.store.stock_rows_for(&upc("12")).await.unwrap()[0].id;
        f.stock.delete_row(row).await.unwrap();
        assert!(matches!(f.stock.delete_row(row).await, Err(FoodError::NotFound(_))));
        assert!(f.catalog.by_upc(&upc("12")).await.unwrap().is_some());

        f.catalog.delete(product.id, false).await.unwrap();
    }

    #[tokio::test]
    async fn force_deletes_referenced_product() {
        let f = fixture();
        stocked(&f, "13", 1, 1.0).await;
        let product = f.catalog.by_upc(&upc("13")).await.unwrap().unwrap();
        f.catalog.delete(product.id, true).await.unwrap();
        assert_eq!(f.store.stock_rows_for(&upc("13")).await.unwrap().len(), 1);
    }
}
