use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::{auth::ApiKey, state::AppState};

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Components {
    pub store: StoreHealth,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: Components,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

#[instrument(skip(state))]
pub async fn health(
    State(state): State<AppState>,
    _key: ApiKey,
) -> (StatusCode, Json<HealthResponse>) {
    let (code, store) = match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            StoreHealth {
                status: "ok",
                code: None,
                detail: None,
            },
        ),
        Err(e) => {
            warn!(error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                StoreHealth {
                    status: "unavailable",
                    code: Some(e.code()),
                    detail: Some(e.to_string()),
                },
            )
        }
    };
    let status = if code == StatusCode::OK { "ok" } else { "degraded" };
    (
        code,
        Json(HealthResponse {
            status,
            components: Components { store },
        }),
    )
}
