//! Streaming chat completions passthrough.

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use super::{ProviderAuthRequest, ProviderProxy, upstream_message};
use crate::error::ApiError;

impl ProviderProxy {
    /// Forward a chat request to `<baseUrl>/chat/completions` with streaming
    /// forced on. The upstream body is piped back as it arrives.
    pub async fn chat(&self, mut body: Map<String, Value>) -> Result<Response, ApiError> {
        let auth = ProviderAuthRequest::take_from(&mut body);
        let resolved = self.resolve(auth).await?;

        body.insert("stream".to_string(), Value::Bool(true));
        if !body.contains_key("model")
            && let Some(model) = &resolved.default_models.chat
        {
            body.insert("model".to_string(), Value::String(model.clone()));
        }

        let upstream = self
            .client
            .post(resolved.endpoint("chat/completions"))
            .bearer_auth(resolved.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::ProviderChatFailed {
                status: 502,
                message: e.to_string(),
            })?;

        let status = upstream.status();
        if !status.is_success() {
            let text = upstream.text().await.unwrap_or_default();
            tracing::warn!(
                provider = resolved.provider_id.as_deref().unwrap_or("override"),
                status = status.as_u16(),
                "Provider chat request failed"
            );
            return Err(ApiError::ProviderChatFailed {
                status: status.as_u16(),
                message: upstream_message(&text, "provider rejected the chat request"),
            });
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Ok(response)
    }
}
