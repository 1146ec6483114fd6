use std::{collections::BTreeMap, sync::Arc};

use tracing::info;

use crate::{
    db::{Store, TargetsRepo},
    error::FoodError,
};

/// Daily reference values used for any macro without an override.
pub const DEFAULT_TARGETS: [(&str, f64); 4] = [
    ("calories", 2000.0),
    ("protein", 50.0),
    ("fat", 78.0),
    ("carbs", 275.0),
];

pub type TargetMap = BTreeMap<String, f64>;

fn is_known(name: &str) -> bool {
    DEFAULT_TARGETS.iter().any(|(k, _)| *k == name)
}

/// Targets store: per-macro goals with defaults.
#[derive(Clone)]
pub struct Targets {
    store: Arc<dyn Store>,
}

impl Targets {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<TargetMap, FoodError> {
        let overrides = self.store.target_overrides().await?;
        Ok(DEFAULT_TARGETS
            .iter()
            .map(|(k, default)| {
                let v = overrides.get(*k).copied().unwrap_or(*default);
                (k.to_string(), v)
            })
            .collect())
    }

    /// Merges the given overrides; `null` entries are skipped.
    pub async fn patch(&self, input: BTreeMap<String, Option<f64>>) -> Result<TargetMap, FoodError> {
        let mut values = TargetMap::new();
        for (name, value) in input {
            if !is_known(&name) {
                return Err(FoodError::validation(format!("unknown macro: {name}")));
            }
            let Some(value) = value else { continue };
            if !value.is_finite() || value < 0.0 {
                return Err(FoodError::validation(format!(
                    "target for {name} must be a non-negative number"
                )));
            }
            values.insert(name, value);
        }
        if values.is_empty() {
            return Err(FoodError::validation("no target values supplied"));
        }
        self.store.set_targets(&values).await?;
        info!(macros = ?values.keys().collect::<Vec<_>>(), "targets updated");
        self.get().await
    }

    pub async fn reset_all(&self) -> Result<TargetMap, FoodError> {
        self.store.clear_targets().await?;
        info!("targets reset to defaults");
        self.get().await
    }

    pub async fn reset_one(&self, name: &str) -> Result<TargetMap, FoodError> {
        if !is_known(name) {
            return Err(FoodError::not_found(format!("macro {name}")));
        }
        self.store.clear_target(name).await?;
        self.get().await
    }
}
