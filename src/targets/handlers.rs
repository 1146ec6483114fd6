use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::services::TargetMap;
use crate::{
    auth::ApiKey, error::FoodError, response::Envelope, state::AppState, types::from_json,
};

#[derive(Debug, Serialize)]
pub struct TargetsResponse {
    pub targets: TargetMap,
}

pub fn targets_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/targets",
            get(get_targets).patch(patch_targets).delete(reset_targets),
        )
        .route("/targets/:name", delete(reset_target))
}

#[instrument(skip(state))]
pub async fn get_targets(
    State(state): State<AppState>,
    _key: ApiKey,
) -> Result<Json<TargetsResponse>, FoodError> {
    let targets = state.targets.get().await?;
    Ok(Json(TargetsResponse { targets }))
}

#[instrument(skip(state, body))]
pub async fn patch_targets(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<TargetsResponse>>, FoodError> {
    let Json(body) = body?;
    let input: BTreeMap<String, Option<f64>> = from_json(body)?;
    let targets = state.targets.patch(input).await?;
    Ok(Json(Envelope::ok("targets updated", TargetsResponse { targets })))
}

#[instrument(skip(state))]
pub async fn reset_targets(
    State(state): State<AppState>,
    _key: ApiKey,
) -> Result<Json<Envelope<TargetsResponse>>, FoodError> {
    let targets = state.targets.reset_all().await?;
    Ok(Json(Envelope::ok("targets reset", TargetsResponse { targets })))
}

#[instrument(skip(state))]
pub async fn reset_target(
    State(state): State<AppState>,
    _key: ApiKey,
    name: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<TargetsResponse>>, FoodError> {
    let Path(name) = name?;
    let targets = state.targets.reset_one(&name).await?;
    Ok(Json(Envelope::ok(
        format!("target for {name} reset"),
        TargetsResponse { targets },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn patch_body_must_be_an_object_of_numbers() {
        let err = patch_targets(State(AppState::fake()), ApiKey, Ok(Json(json!({ "fat": "lots" }))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_macro_reset_is_not_found() {
        let err = reset_target(State(AppState::fake()), ApiKey, Ok(Path("sodium".into())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
