use std::{str::FromStr, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use thiserror::Error;
use tracing::warn;

use crate::config::AppConfig;

pub mod memory;

pub use crate::{
    catalog::repo::CatalogRepo, log::repo::LogRepo, stock::repo::StockRepo,
    targets::repo::TargetsRepo,
};
pub use memory::MemoryStore;

/// Failures reported by the document store behind the pantry.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("unique key violated: {0}")]
    Conflict(String),

    #[error("store not configured: {0}")]
    NotConfigured(&'static str),

    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store rejected credentials: {0}")]
    AuthRejected(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict(_) => "conflict",
            StoreError::NotConfigured(_) => "store_not_configured",
            StoreError::Unreachable(_) => "store_unreachable",
            StoreError::AuthRejected(_) => "store_auth_rejected",
            StoreError::Timeout => "store_timeout",
            StoreError::OutOfRange(_) => "out_of_range",
            StoreError::Backend(_) => "store_error",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                StoreError::Unreachable(e.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => StoreError::Conflict(db.message().to_string()),
                Some("22003") => StoreError::OutOfRange(db.message().to_string()),
                Some("28P01") | Some("28000") => StoreError::AuthRejected(db.message().to_string()),
                // query_canceled, raised when statement_timeout fires
                Some("57014") => StoreError::Timeout,
                _ => StoreError::Backend(e.to_string()),
            },
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// The whole operation set the pantry needs from its store.
#[async_trait]
pub trait Store: CatalogRepo + StockRepo + LogRepo + TargetsRepo + Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store. Without `DATABASE_URL` every call fails as not configured.
#[derive(Clone)]
pub struct PgStore {
    pool: Option<PgPool>,
}

impl PgStore {
    pub fn connect_lazy(config: &AppConfig) -> anyhow::Result<Self> {
        let Some(url) = config.database_url.as_deref() else {
            warn!("DATABASE_URL not set; storage calls will fail until it is configured");
            return Ok(Self { pool: None });
        };

        let timeout_ms = config.store_timeout_secs * 1000;
        let options = PgConnectOptions::from_str(url)
            .context("parse DATABASE_URL")?
            .application_name("pantry")
            .options([("statement_timeout", timeout_ms)]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.store_timeout_secs))
            .connect_lazy_with(options);

        Ok(Self { pool: Some(pool) })
    }

    pub(crate) fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool
            .as_ref()
            .ok_or(StoreError::NotConfigured("set DATABASE_URL"))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        let pool = self.pool().context("run migrations")?;
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("apply migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(self.pool()?).await?;
        Ok(())
    }
}
