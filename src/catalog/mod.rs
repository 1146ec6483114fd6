pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::{Product, ProductFilter};
pub use services::{Catalog, ProductSeed, Upserted};

pub fn router() -> Router<AppState> {
    handlers::catalog_routes()
}
