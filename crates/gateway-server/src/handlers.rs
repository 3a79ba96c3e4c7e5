//! HTTP request handlers for the gateway API.

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{
    validate_completion_request, CompletionMode, CompletionParams, GatewayError,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    error::ApiError,
    extractors::{Credential, ProviderHint, RequestId},
    resolver::CompletionFunction,
    state::AppState,
    usage::UsageContext,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.gather();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics,
    )
}

/// Model entry in the list response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelObject {
    /// Model name as callers request it
    pub id: String,
    /// Always "model"
    pub object: &'static str,
    /// Provider serving the model
    pub owned_by: String,
}

/// `GET /v1/models` response
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    /// Always "list"
    pub object: &'static str,
    /// Authorized models
    pub data: Vec<ModelObject>,
}

/// List the caller's authorized models (OpenAI compatible).
///
/// Internal model record ids are never exposed.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn list_models(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Credential(credential): Credential,
) -> Result<Json<ModelsResponse>, ApiError> {
    let api_key = state
        .access_guard()
        .authenticate(credential.as_deref())
        .await?;
    let models = state.store.get_authorized_models(&api_key.id).await?;

    let data = models
        .into_iter()
        .map(|m| ModelObject {
            id: m.name,
            object: "model",
            owned_by: m.provider,
        })
        .collect();

    Ok(Json(ModelsResponse {
        object: "list",
        data,
    }))
}

/// Chat completion endpoint (OpenAI compatible)
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn chat_completions(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Credential(credential): Credential,
    ProviderHint(provider_hint): ProviderHint,
    body: Bytes,
) -> Result<Response, ApiError> {
    process_completion(&state, credential.as_deref(), provider_hint.as_deref(), &body)
        .await
        .map_err(|e| {
            warn!(code = e.error_code(), error = %e, "Completion request rejected");
            state.metrics.record_rejection(e.error_code());
            ApiError::from(e)
        })
}

async fn process_completion(
    state: &AppState,
    credential: Option<&str>,
    provider_hint: Option<&str>,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let guard = state.access_guard();
    let api_key = guard.authenticate(credential).await?;

    let request = validate_completion_request(body)?;

    guard.check_limits(&api_key).await?;

    let mode = if request.is_streaming() {
        CompletionMode::Streaming
    } else {
        CompletionMode::Buffered
    };

    let resolution = state
        .resolver()
        .resolve(&api_key, &request.model, provider_hint, mode)
        .await?;

    debug!(
        model = %resolution.model.name,
        provider = %resolution.model.provider,
        mode = %mode,
        messages = request.messages.len(),
        "Dispatching completion"
    );

    let context = UsageContext::new(&api_key, &resolution.model);
    let params = CompletionParams::from_request(request, resolution.model.name.clone());
    let dispatcher = state.dispatcher();

    match resolution.function {
        CompletionFunction::Buffered(function) => dispatcher.buffered(function, params, context).await,
        CompletionFunction::Streaming(function) => Ok(dispatcher.streaming(function, params, context)),
    }
}
