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
use time::OffsetDateTime;
use tracing::instrument;

use super::{
    dto::{AppendRequest, DayQuery, DeletedEntry},
    repo_types::LogEntry,
    services::{parse_day, DayLog},
};
use crate::{
    auth::ApiKey,
    error::FoodError,
    response::Envelope,
    state::AppState,
    types::{from_json, parse_id},
};

pub fn log_routes() -> Router<AppState> {
    Router::new()
        .route("/log", get(day_log).post(append_entry))
        .route("/log/undo", post(undo_last))
        .route("/log/:id", delete(delete_entry))
}

#[instrument(skip(state))]
pub async fn day_log(
    State(state): State<AppState>,
    _key: ApiKey,
    query: Result<Query<DayQuery>, QueryRejection>,
) -> Result<Json<DayLog>, FoodError> {
    let Query(query) = query?;
    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => parse_day(raw)?,
        None => OffsetDateTime::now_utc().date(),
    };
    Ok(Json(state.log.day(date).await?))
}

#[instrument(skip(state, body))]
pub async fn append_entry(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<LogEntry>>), FoodError> {
    let Json(body) = body?;
    let req: AppendRequest = from_json(body)?;
    let entry = state.log.append(&req.upc, req.units, req.timestamp).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok("log entry added", entry))))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    _key: ApiKey,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<DeletedEntry>>, FoodError> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    let changed = state.log.soft_delete(id).await?;
    let message = if changed {
        "log entry deleted"
    } else {
        "log entry was already deleted"
    };
    Ok(Json(Envelope::ok(message, DeletedEntry { id, changed })))
}

#[instrument(skip(state))]
pub async fn undo_last(
    State(state): State<AppState>,
    _key: ApiKey,
) -> Result<Json<Envelope<LogEntry>>, FoodError> {
    let entry = state.log.undo().await?;
    Ok(Json(Envelope::ok("last log entry undone", entry)))
}
