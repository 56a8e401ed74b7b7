//! Service-to-service key check for the internal dispatch endpoint.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::handshake::bearer_token;
use crate::error::ApiError;
use crate::AppState;

/// Marker extractor: the request carried the configured internal API key, or
/// no key is configured.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.internal_api_key.as_deref() else {
            return Ok(InternalCaller);
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        if presented != expected {
            return Err(ApiError::unauthorized("Invalid internal API key"));
        }

        Ok(InternalCaller)
    }
}
