use crate::catalog::Catalog;
use crate::config::{AppConfig, LookupConfig};
use crate::db::{MemoryStore, PgStore, Store};
use crate::log::NutritionLog;
use crate::lookup::{NoLookup, OpenFoodFacts, ProductLookup};
use crate::stock::Stock;
use crate::targets::Targets;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub catalog: Catalog,
    pub stock: Stock,
    pub log: NutritionLog,
    pub targets: Targets,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect_lazy(&config)?;
        if let Err(e) = store.migrate().await {
            tracing::warn!(error = %e, "migrations not applied; continuing");
        }

        let lookup = lookup_from(&config.lookup)?;
        Ok(Self::from_parts(config, Arc::new(store), lookup))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        lookup: Arc<dyn ProductLookup>,
    ) -> Self {
        let catalog = Catalog::new(store.clone());
        let targets = Targets::new(store.clone());
        let log = NutritionLog::new(store.clone(), targets.clone());
        let stock = Stock::new(store.clone(), catalog.clone(), log.clone(), lookup);
        Self {
            config,
            store,
            catalog,
            stock,
            log,
            targets,
        }
    }

    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            api_key: Some("test-key".into()),
            max_connections: 1,
            store_timeout_secs: 1,
            lookup: LookupConfig {
                enabled: false,
                base_url: "http://fake.local".into(),
                timeout_secs: 1,
            },
        });
        Self::from_parts(config, Arc::new(MemoryStore::new()), Arc::new(NoLookup))
    }
}

fn lookup_from(config: &LookupConfig) -> anyhow::Result<Arc<dyn ProductLookup>> {
    if !config.enabled {
        tracing::info!("external product lookup disabled");
        return Ok(Arc::new(NoLookup));
    }
    Ok(Arc::new(OpenFoodFacts::new(config)?))
}
