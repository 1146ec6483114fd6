use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    dto::ProductPatch,
    repo_types::{NewProduct, Product, ProductFilter},
};
use crate::{
    db::{CatalogRepo, Store, StoreError},
    error::FoodError,
    nutrition::Nutrition,
    types::{union_ci, Patch, StringList, Upc},
};

const MAX_SEED_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

/// Product data arriving with a stock write or from the external lookup.
/// Merged into the catalog additively: lists are unioned, nutrition keys overwritten one by one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductSeed {
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
}

impl ProductSeed {
    /// Lays `self` over `base`: a supplied name wins, lists are unioned, supplied nutrition keys win.
    pub fn overlay(self, base: ProductSeed) -> ProductSeed {
        let mut nutrition = base.nutrition;
        nutrition.merge(&self.nutrition);
        ProductSeed {
            name: self.name.or(base.name),
            tags: union_ci(&self.tags, &base.tags),
            ingredients: union_ci(&self.ingredients, &base.ingredients),
            nutrition,
        }
    }
}

pub(crate) fn clean_name(raw: &str) -> Result<String, FoodError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(FoodError::validation("name must not be empty"));
    }
    Ok(name.to_owned())
}

/// Applies a three-state patch to a copy of `product`.
pub(crate) fn merge_patch(product: &Product, patch: &ProductPatch) -> Result<Product, FoodError> {
    let mut out = product.clone();
    match &patch.name {
        Patch::Absent => {}
        Patch::Null => return Err(FoodError::validation("name cannot be cleared")),
        Patch::Value(name) => out.name = clean_name(name)?,
    }
    match &patch.tags {
        Patch::Absent => {}
        Patch::Null => out.tags.clear(),
        Patch::Value(tags) => out.tags = tags.as_slice().to_vec(),
    }
    match &patch.ingredients {
        Patch::Absent => {}
        Patch::Null => out.ingredients.clear(),
        Patch::Value(list) => out.ingredients = list.as_slice().to_vec(),
    }
    match &patch.nutrition {
        Patch::Absent => {}
        Patch::Null => out.nutrition = Nutrition::default(),
        Patch::Value(input) => out.nutrition = Nutrition::from_input(input.clone())?,
    }
    apply_macros(&mut out.nutrition, patch)?;
    Ok(out)
}

fn apply_macros(nutrition: &mut Nutrition, patch: &ProductPatch) -> Result<(), FoodError> {
    for (key, field) in patch.macro_fields() {
        match field {
            Patch::Absent => {}
            Patch::Null => nutrition.remove(key),
            Patch::Value(v) => nutrition.set(key, *v)?,
        }
    }
    Ok(())
}

fn new_product(patch: &ProductPatch) -> Result<NewProduct, FoodError> {
    let name = match &patch.name {
        Patch::Value(name) => clean_name(name)?,
        _ => return Err(FoodError::validation("name is required to create a product")),
    };
    let list = |p: &Patch<StringList>| match p {
        Patch::Value(v) => v.as_slice().to_vec(),
        _ => Vec::new(),
    };
    let mut nutrition = match &patch.nutrition {
        Patch::Value(input) => Nutrition::from_input(input.clone())?,
        _ => Nutrition::default(),
    };
    apply_macros(&mut nutrition, patch)?;
    Ok(NewProduct {
        upc: patch.upc.clone(),
        name,
        tags: list(&patch.tags),
        ingredients: list(&patch.ingredients),
        nutrition,
    })
}

fn merge_seed(product: &Product, seed: &ProductSeed) -> Product {
    let mut out = product.clone();
    if let Some(name) = &seed.name {
        out.name = name.clone();
    }
    out.tags = union_ci(&product.tags, &seed.tags);
    out.ingredients = union_ci(&product.ingredients, &seed.ingredients);
    out.nutrition.merge(&seed.nutrition);
    out
}

fn duplicate_upc(upc: Option<&Upc>, e: StoreError) -> FoodError {
    match (e, upc) {
        (StoreError::Conflict(_), Some(upc)) => {
            FoodError::Conflict(format!("a product with UPC {upc} already exists"))
        }
        (other, _) => other.into(),
    }
}

/// Catalog manager: product master records keyed by UPC.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the product when no entry has the UPC, otherwise merges the patch into it.
    pub async fn upsert(&self, patch: ProductPatch) -> Result<(Product, Upserted), FoodError> {
        if let Some(upc) = &patch.upc {
            if let Some(existing) = self.store.product_by_upc(upc).await? {
                let merged = merge_patch(&existing, &patch)?;
                if merged == existing {
                    debug!(upc = %upc, "upsert changed nothing");
                    return Ok((existing, Upserted::Updated));
                }
                return match self.store.replace_product(&merged).await? {
                    Some(saved) => {
                        info!(upc = %upc, id = %saved.id, "product updated");
                        Ok((saved, Upserted::Updated))
                    }
                    None => Err(FoodError::Conflict(format!(
                        "product {upc} was modified concurrently; retry"
                    ))),
                };
            }
        }

        let new = new_product(&patch)?;
        let created = self
            .store
            .insert_product(&new)
            .await
            .map_err(|e| duplicate_upc(new.upc.as_ref(), e))?;
        info!(id = %created.id, upc = ?created.upc.as_ref().map(Upc::as_str), "product created");
        Ok((created, Upserted::Created))
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, FoodError> {
        self.store
            .product_by_id(id)
            .await?
            .ok_or_else(|| FoodError::not_found(format!("product {id}")))
    }

    pub async fn by_upc(&self, upc: &Upc) -> Result<Option<Product>, FoodError> {
        Ok(self.store.product_by_upc(upc).await?)
    }

    /// Lazy, restartable cursor in insertion order.
    pub fn search(&self, filter: ProductFilter) -> BoxStream<'_, Result<Product, FoodError>> {
        self.store
            .search_products(filter)
            .map(|item| item.map_err(FoodError::from))
            .boxed()
    }

    pub async fn delete(&self, id: Uuid, force: bool) -> Result<Product, FoodError> {
        let product = self.get(id).await?;
        if let (false, Some(upc)) = (force, &product.upc) {
            let refs = self.store.product_references(upc).await?;
            if refs.any() {
                return Err(FoodError::Reference(format!(
                    "product {upc} is referenced by {} stock row(s) and {} log entr(ies); use force=true to delete it anyway",
                    refs.stock_rows, refs.log_entries
                )));
            }
        }
        if !self.store.delete_product(id).await? {
            return Err(FoodError::not_found(format!("product {id}")));
        }
        if force {
            warn!(id = %id, "product force-deleted");
        } else {
            info!(id = %id, "product deleted");
        }
        Ok(product)
    }

    /// Additive catalog sync used by stock writes. Creates the entry when the UPC is new;
    /// a name is required in that case.
    pub async fn sync_seed(&self, upc: &Upc, seed: &ProductSeed) -> Result<Product, FoodError> {
        for _ in 0..MAX_SEED_ATTEMPTS {
            if let Some(existing) = self.store.product_by_upc(upc).await? {
                let merged = merge_seed(&existing, seed);
                if merged == existing {
                    return Ok(existing);
                }
                match self.store.replace_product(&merged).await? {
                    Some(saved) => return Ok(saved),
                    None => {
                        debug!(upc = %upc, "catalog entry changed under seed merge; re-reading");
                        continue;
                    }
                }
            }

            let Some(name) = seed.name.clone() else {
                return Err(FoodError::validation(format!(
                    "name is required for new product {upc}"
                )));
            };
            let new = NewProduct {
                upc: Some(upc.clone()),
                name,
                tags: seed.tags.clone(),
                ingredients: seed.ingredients.clone(),
                nutrition: seed.nutrition.clone(),
            };
            match self.store.insert_product(&new).await {
                Ok(created) => {
                    info!(upc = %upc, id = %created.id, "product created from stock write");
                    return Ok(created);
                }
                // created concurrently; merge into it on the next pass
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(FoodError::Conflict(format!(
            "product {upc} kept changing while stock was being added; retry"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, types::from_json};
    use futures::TryStreamExt;
    use serde_json::json;

    fn catalog() -> (Catalog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Catalog::new(store.clone()), store)
    }

    async fn upsert(catalog: &Catalog, body: serde_json::Value) -> Result<(Product, Upserted), FoodError> {
        catalog.upsert(from_json(body)?).await
    }

    #[tokio::test]
    async fn create_requires_name() {
        let (catalog, _) = catalog();
        let err = upsert(&catalog, json!({ "upc": "012345" })).await.unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
    }

    #[tokio::test]
    async fn upc_format_is_checked_before_anything_is_written() {
        let (catalog, _) = catalog();
        for bad in [json!({ "upc": 70662404072u64, "name": "Apple" }), json!({ "upc": "07066-2404072", "name": "Apple" })] {
            let err = upsert(&catalog, bad).await.unwrap_err();
            assert!(matches!(err, FoodError::Validation(_)));
        }
        let (p, how) = upsert(&catalog, json!({ "upc": "070662404072", "name": "Apple" }))
            .await
            .unwrap();
        assert_eq!(how, Upserted::Created);
        assert_eq!(p.upc.unwrap().as_str(), "070662404072");
    }

    #[tokio::test]
    async fn null_clears_and_absent_keeps() {
        let (catalog, _) = catalog();
        upsert(
            &catalog,
            json!({ "upc": "111", "name": "Apple", "nutrition": { "calories": 95, "fat": 0.3 } }),
        )
        .await
        .unwrap();

        let (kept, how) = upsert(&catalog, json!({ "upc": "111", "tags": ["fruit"] })).await.unwrap();
        assert_eq!(how, Upserted::Updated);
        assert_eq!(kept.nutrition.get("calories"), Some(95.0));

        let (cleared, _) = upsert(&catalog, json!({ "upc": "111", "calories": null })).await.unwrap();
        assert_eq!(cleared.nutrition.get("calories"), None);
        assert_eq!(cleared.nutrition.get("fat"), Some(0.3));

        let (no_tags, _) = upsert(&catalog, json!({ "upc": "111", "tags": null })).await.unwrap();
        assert!(no_tags.tags.is_empty());
    }

    #[tokio::test]
    async fn nested_nutrition_replaces_the_whole_map() {
        let (catalog, _) = catalog();
        upsert(
            &catalog,
            json!({ "upc": "222", "name": "Bar", "nutrition": { "calories": 200, "protein": 10 } }),
        )
        .await
        .unwrap();
        let (p, _) = upsert(&catalog, json!({ "upc": "222", "nutrition": { "fat": 9 }, "carbs": 20 }))
            .await
            .unwrap();
        assert_eq!(p.nutrition.get("calories"), None);
        assert_eq!(p.nutrition.get("fat"), Some(9.0));
        assert_eq!(p.nutrition.get("carbs"), Some(20.0));
    }

    #[tokio::test]
    async fn repeating_an_upsert_is_idempotent() {
        let (catalog, _) = catalog();
        let body = json!({ "upc": "333", "name": "Oats", "tags": ["Grain", "grain"], "protein": 5 });
        upsert(&catalog, body.clone()).await.unwrap();
        let (once, _) = upsert(&catalog, json!({ "upc": "333", "tags": ["breakfast"] })).await.unwrap();
        let (twice, _) = upsert(&catalog, json!({ "upc": "333", "tags": ["breakfast"] })).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.tags, vec!["breakfast"]);
    }

    #[tokio::test]
    async fn name_cannot_be_blanked() {
        let (catalog, _) = catalog();
        upsert(&catalog, json!({ "upc": "444", "name": "Milk" })).await.unwrap();
        for body in [json!({ "upc": "444", "name": null }), json!({ "upc": "444", "name": "   " })] {
            let err = upsert(&catalog, body).await.unwrap_err();
            assert!(matches!(err, FoodError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn unknown_fields_are_rejected() {
        let (catalog, _) = catalog();
        let err = upsert(&catalog, json!({ "upc": "555", "name": "Tea", "colour": "green" }))
            .await
            .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_insert_surfaces_as_conflict() {
        let (catalog, store) = catalog();
        let new = NewProduct {
            upc: Some(Upc::parse("777").unwrap()),
            name: "Rice".into(),
            tags: vec![],
            ingredients: vec![],
            nutrition: Nutrition::default(),
        };
        store.insert_product(&new).await.unwrap();
        let err = store.insert_product(&new).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(matches!(duplicate_upc(new.upc.as_ref(), err), FoodError::Conflict(_)));
        assert!(catalog.by_upc(new.upc.as_ref().unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_composes_filters_in_insertion_order() {
        let (catalog, _) = catalog();
        upsert(&catalog, json!({ "upc": "1", "name": "Green Apple", "tags": ["Fruit"] })).await.unwrap();
        upsert(&catalog, json!({ "upc": "2", "name": "Banana", "tags": ["fruit"], "ingredients": ["apple flavour"] }))
            .await
            .unwrap();
        upsert(&catalog, json!({ "upc": "3", "name": "Apple Pie", "tags": ["dessert"] })).await.unwrap();

        let hits: Vec<Product> = catalog
            .search(ProductFilter::new(Some("APPLE".into()), None, Some("FRUIT".into())))
            .try_collect()
            .await
            .unwrap();
        let names: Vec<_> = hits.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Green Apple", "Banana"]);

        let exact: Vec<Product> = catalog
            .search(ProductFilter::new(None, Some("3".into()), None))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);

        let again: Vec<Product> = catalog.search(ProductFilter::default()).try_collect().await.unwrap();
        assert_eq!(again.len(), 3);
    }

    #[tokio::test]
    async fn seed_unions_lists_and_merges_nutrition() {
        let (catalog, _) = catalog();
        upsert(
            &catalog,
            json!({ "upc": "888", "name": "Chips", "tags": ["b"], "nutrition": { "calories": 150, "fat": 10 } }),
        )
        .await
        .unwrap();
        let upc = Upc::parse("888").unwrap();
        let seed = ProductSeed {
            tags: vec!["a".into(), "B".into()],
            nutrition: [("calories".to_string(), 160.0)].into_iter().collect(),
            ..Default::default()
        };
        let p = catalog.sync_seed(&upc, &seed).await.unwrap();
        assert_eq!(p.tags, vec!["b", "a"]);
        assert_eq!(p.nutrition.get("calories"), Some(160.0));
        assert_eq!(p.nutrition.get("fat"), Some(10.0));
    }

    #[tokio::test]
    async fn seed_for_unknown_upc_needs_a_name() {
        let (catalog, _) = catalog();
        let upc = Upc::parse("999").unwrap();
        let err = catalog.sync_seed(&upc, &ProductSeed::default()).await.unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let (catalog, _) = catalog();
        assert!(matches!(catalog.get(Uuid::new_v4()).await, Err(FoodError::NotFound(_))));
        assert!(matches!(
            catalog.delete(Uuid::new_v4(), false).await,
            Err(FoodError::NotFound(_))
        ));
    }

    #[test]
    fn overlay_prefers_supplied_fields() {
        let supplied = ProductSeed {
            name: None,
            tags: vec!["mine".into()],
            ingredients: vec![],
            nutrition: [("calories".to_string(), 1.0)].into_iter().collect(),
        };
        let looked_up = ProductSeed {
            name: Some("Looked Up".into()),
            tags: vec!["theirs".into()],
            ingredients: vec!["salt".into()],
            nutrition: [("calories".to_string(), 2.0), ("fat".to_string(), 3.0)]
                .into_iter()
                .collect(),
        };
        let merged = supplied.overlay(looked_up);
        assert_eq!(merged.name.as_deref(), Some("Looked Up"));
        assert_eq!(merged.tags, vec!["mine", "theirs"]);
        assert_eq!(merged.ingredients, vec!["salt"]);
        assert_eq!(merged.nutrition.get("calories"), Some(1.0));
        assert_eq!(merged.nutrition.get("fat"), Some(3.0));
    }
}
