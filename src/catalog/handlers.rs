use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use futures::TryStreamExt;
use serde_json::Value;
use tracing::instrument;

use super::{
    dto::{DeleteParams, DeletedProduct, ProductPatch, SearchParams},
    repo_types::{Product, ProductFilter},
    services::Upserted,
};
use crate::{
    auth::ApiKey,
    error::FoodError,
    response::{Envelope, ItemsResponse},
    state::AppState,
    types::{from_json, parse_id},
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(search_products).post(upsert_product))
        .route("/catalog/:id", get(get_product).delete(delete_product))
}

#[instrument(skip(state))]
pub async fn search_products(
    State(state): State<AppState>,
    _key: ApiKey,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<ItemsResponse<Vec<Product>>>, FoodError> {
    let Query(params) = params?;
    let filter = ProductFilter::new(params.q, params.upc, params.tag);
    let items: Vec<Product> = state.catalog.search(filter).try_collect().await?;
    Ok(Json(ItemsResponse { items }))
}

#[instrument(skip(state, body))]
pub async fn upsert_product(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Product>>), FoodError> {
    let Json(body) = body?;
    let patch: ProductPatch = from_json(body)?;
    let (product, how) = state.catalog.upsert(patch).await?;
    Ok(match how {
        Upserted::Created => (
            StatusCode::CREATED,
            Json(Envelope::ok("product created", product)),
        ),
        Upserted::Updated => (StatusCode::OK, Json(Envelope::ok("product updated", product))),
    })
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    _key: ApiKey,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Product>, FoodError> {
    let Path(id) = id?;
    let product = state.catalog.get(parse_id(&id)?).await?;
    Ok(Json(product))
}

#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    _key: ApiKey,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> Result<Json<Envelope<DeletedProduct>>, FoodError> {
    let Path(id) = id?;
    let Query(params) = params?;
    let deleted = state.catalog.delete(parse_id(&id)?, params.force).await?;
    Ok(Json(Envelope::ok(
        "product deleted",
        DeletedProduct { id: deleted.id },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::FromRequest,
        http::{header, Request, Uri},
        response::IntoResponse,
    };
    use serde_json::json;

    #[tokio::test]
    async fn create_then_update_reports_status() {
        let state = AppState::fake();
        let (status, Json(created)) = upsert_product(
            State(state.clone()),
            ApiKey,
            Ok(Json(json!({ "upc": "42", "name": "Tea" }))),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.success);

        let (status, Json(updated)) = upsert_product(
            State(state.clone()),
            ApiKey,
            Ok(Json(json!({ "upc": "42", "tags": "hot" }))),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated.data.tags, vec!["hot"]);

        let Json(found) = get_product(State(state), ApiKey, Ok(Path(created.data.id.to_string())))
            .await
            .unwrap();
        assert_eq!(found.id, created.data.id);
    }

    #[tokio::test]
    async fn numeric_upc_is_a_bad_request() {
        let err = upsert_product(
            State(AppState::fake()),
            ApiKey,
            Ok(Json(json!({ "upc": 42, "name": "Tea" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    async fn rejected_body(req: Request<Body>) -> FoodError {
        let rejection = Json::<Value>::from_request(req, &()).await.unwrap_err();
        upsert_product(State(AppState::fake()), ApiKey, Err(rejection))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn malformed_json_gets_a_structured_error() {
        let req = Request::builder()
            .method("POST")
            .uri("/catalog")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"upc": "1", "#))
            .unwrap();
        let err = rejected_body(req).await;
        assert!(matches!(err, FoodError::Validation(_)));

        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["code"], "invalid_input");
    }

    #[tokio::test]
    async fn missing_content_type_is_a_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/catalog")
            .body(Body::from(r#"{"upc": "1", "name": "Tea"}"#))
            .unwrap();
        assert_eq!(rejected_body(req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_query_is_a_bad_request() {
        let uri: Uri = "/catalog/x?force=maybe".parse().unwrap();
        let rejection = Query::<DeleteParams>::try_from_uri(&uri).unwrap_err();
        let err = delete_product(
            State(AppState::fake()),
            ApiKey,
            Ok(Path(uuid::Uuid::new_v4().to_string())),
            Err(rejection),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FoodError::Validation(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_id_is_a_bad_request() {
        let err = get_product(State(AppState::fake()), ApiKey, Ok(Path("not-a-uuid".into())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
