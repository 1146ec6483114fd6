pub mod handlers;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::{TargetMap, Targets, DEFAULT_TARGETS};

pub fn router() -> Router<AppState> {
    handlers::targets_routes()
}
