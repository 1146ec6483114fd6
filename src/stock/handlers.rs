use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::instrument;

use super::{
    dto::{AddRequest, ConsumeRequest, DeletedRow, ListParams, RemoveRequest},
    services::{AddOutcome, ConsumeOutcome, RemoveOutcome, StockListing, StockView},
};
use crate::{
    auth::ApiKey,
    error::FoodError,
    response::{Envelope, ItemsResponse},
    state::AppState,
    types::{from_json, parse_id},
};

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stock", get(list_stock).post(add_stock))
        .route("/stock/consume", post(consume_stock))
        .route("/stock/remove", post(remove_stock))
        .route("/stock/:id", delete(delete_stock_row))
}

#[instrument(skip(state))]
pub async fn list_stock(
    State(state): State<AppState>,
    _key: ApiKey,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ItemsResponse<StockListing>>, FoodError> {
    let Query(params) = params?;
    let view = StockView::parse(params.view.as_deref())?;
    let items = state.stock.list(view).await?;
    Ok(Json(ItemsResponse { items }))
}

#[instrument(skip(state, body))]
pub async fn add_stock(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<AddOutcome>>), FoodError> {
    let Json(body) = body?;
    let req: AddRequest = from_json(body)?;
    let outcome = state.stock.add(req.items).await?;
    let message = format!("{} stock row(s) updated", outcome.count);
    Ok((StatusCode::CREATED, Json(Envelope::ok(message, outcome))))
}

#[instrument(skip(state, body))]
pub async fn consume_stock(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<ConsumeOutcome>>, FoodError> {
    let Json(body) = body?;
    let req: ConsumeRequest = from_json(body)?;
    let outcome = state.stock.consume(&req.upc, req.units).await?;
    Ok(Json(Envelope::ok("stock consumed and logged", outcome)))
}

#[instrument(skip(state, body))]
pub async fn remove_stock(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<RemoveOutcome>>, FoodError> {
    let Json(body) = body?;
    let req: RemoveRequest = from_json(body)?;
    let outcome = state
        .stock
        .remove(&req.upc, req.units, req.reason.as_deref())
        .await?;
    Ok(Json(Envelope::ok("stock removed", outcome)))
}

#[instrument(skip(state))]
pub async fn delete_stock_row(
    State(state): State<AppState>,
    _key: ApiKey,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<DeletedRow>>, FoodError> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    state.stock.delete_row(id).await?;
    Ok(Json(Envelope::ok("stock row deleted", DeletedRow { id })))
}
