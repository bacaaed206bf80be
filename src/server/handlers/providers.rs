//! Provider registry and the chat/image proxies.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::Response,
};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::providers::{ImageGenerationResult, ProviderTestResult};
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::types::*;

pub async fn providers_list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProviderListResponse>, ApiError> {
    let items = state.providers.registry().list().await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn providers_test_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ProviderTestResult>, ApiError> {
    Ok(Json(state.providers.test_provider(&id).await?))
}

/// OpenAI-style chat body plus optional `providerId`, `baseUrl`, `apiKey`
/// and `allowFallback`. Always streamed.
pub async fn proxy_chat_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Response, ApiError> {
    state.providers.chat(body).await
}

pub async fn proxy_images_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Json<ImageGenerationResult>, ApiError> {
    Ok(Json(state.providers.generate_images(body).await?))
}
