//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::state::AppState;

/// Presented API key, if any.
///
/// Read from `Authorization: Bearer <key>` first, then from the configured
/// API key header. Whether the key is valid is decided by the access guard.
#[derive(Debug, Clone)]
pub struct Credential(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for Credential {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(credential_from_headers(
            &parts.headers,
            &state.auth.api_key_header,
        )))
    }
}

fn credential_from_headers(headers: &HeaderMap, api_key_header: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let key = bearer.or_else(|| {
        headers
            .get(api_key_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })?;

    (!key.is_empty()).then(|| key.to_string())
}

/// Explicit provider hint from the configured header
#[derive(Debug, Clone)]
pub struct ProviderHint(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for ProviderHint {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let hint = parts
            .headers
            .get(state.auth.provider_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        Ok(Self(hint))
    }
}

/// Extract request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-request-id")
            .or_else(|| parts.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Ok(Self(id))
    }
}
