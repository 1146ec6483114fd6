use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::{error, warn};

use crate::{error::FoodError, state::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried the shared API key.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

fn same_key(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = FoodError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_key.as_deref() else {
            error!("API_KEY is not set; refusing authenticated routes");
            return Err(FoodError::Misconfigured("set API_KEY"));
        };

        let given = parts
            .headers
            .get(API_KEY_HEADER)
            .map(|h| h.as_bytes())
            .unwrap_or_default();

        if !same_key(given, expected.as_bytes()) {
            warn!(path = %parts.uri.path(), "missing or wrong API key");
            return Err(FoodError::Unauthorized);
        }
        Ok(ApiKey)
    }
}
