use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// Every failure the pantry core reports to its callers.
#[derive(Debug, Error)]
pub enum FoodError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Reference(String),

    #[error("insufficient stock for UPC {upc}: requested {requested}, available {available}")]
    InsufficientStock {
        upc: String,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Storage(StoreError),

    /// A stock decrement went through but the record that should accompany it did not.
    #[error("{detail}")]
    PartiallyApplied { detail: String },

    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("server not configured: {0}")]
    Misconfigured(&'static str),
}

impl FoodError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::Reference(_) => "ReferenceError",
            Self::InsufficientStock { .. } => "InsufficientStockError",
            Self::Storage(_) => "StorageUnavailableError",
            Self::PartiallyApplied { .. } => "PartiallyAppliedError",
            Self::Unauthorized => "AuthenticationError",
            Self::Misconfigured(_) => "ConfigurationError",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Reference(_) => "referenced",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Storage(e) => e.code(),
            Self::PartiallyApplied { .. } => "partially_applied",
            Self::Unauthorized => "unauthorized",
            Self::Misconfigured(_) => "not_configured",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::Reference(_) | Self::InsufficientStock { .. } => {
                StatusCode::CONFLICT
            }
            Self::Storage(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PartiallyApplied { .. } | Self::Misconfigured(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<StoreError> for FoodError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => FoodError::Conflict(msg),
            StoreError::OutOfRange(msg) => FoodError::Validation(msg),
            other => FoodError::Storage(other),
        }
    }
}

// Requests axum cannot decode are reported like any other bad input.
impl From<JsonRejection> for FoodError {
    fn from(e: JsonRejection) -> Self {
        FoodError::Validation(e.body_text())
    }
}

impl From<QueryRejection> for FoodError {
    fn from(e: QueryRejection) -> Self {
        FoodError::Validation(e.body_text())
    }
}

impl From<PathRejection> for FoodError {
    fn from(e: PathRejection) -> Self {
        FoodError::Validation(e.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    code: &'static str,
}

impl IntoResponse for FoodError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.kind(),
            message: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}
