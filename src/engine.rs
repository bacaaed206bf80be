//! Reverse proxy to a workspace's opencode engine instance.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use axum::response::Response;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::auth::{CLIENT_ID_HEADER, HOST_TOKEN_HEADER};
use crate::error::ApiError;
use crate::providers::join_url;
use crate::workspace::Workspace;

pub const ENGINE_DIRECTORY_HEADER: &str = "x-opencode-directory";

/// Upper bound on a buffered request body forwarded to the engine.
const MAX_FORWARD_BODY: usize = 32 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that never reach the engine: our own credentials plus anything
/// the upstream connection sets for itself.
fn is_stripped_request_header(name: &HeaderName) -> bool {
    name == header::AUTHORIZATION
        || name == header::ORIGIN
        || name == header::HOST
        || name == header::CONTENT_LENGTH
        || name.as_str() == HOST_TOKEN_HEADER
        || name.as_str() == CLIENT_ID_HEADER
        || HOP_BY_HOP.contains(&name.as_str())
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineReloadResult {
    pub ok: bool,
    pub status: u16,
}

pub struct EngineBridge {
    client: reqwest::Client,
}

impl EngineBridge {
    pub fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client init failed: {e}")))?;
        Ok(Self { client })
    }

    fn base_url<'a>(&self, workspace: &'a Workspace) -> Result<&'a str, ApiError> {
        workspace
            .engine_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::OpencodeUnconfigured(workspace.id.clone()))
    }

    fn with_engine_auth(
        &self,
        builder: reqwest::RequestBuilder,
        workspace: &Workspace,
    ) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if let Some(creds) = &workspace.engine_credentials {
            builder = builder.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }
        if let Some(directory) = workspace
            .engine_directory
            .as_deref()
            .filter(|d| !d.is_empty())
        {
            builder = builder.header(ENGINE_DIRECTORY_HEADER, directory);
        }
        builder
    }

    /// Forward one request to `<base>/<path>?<query>` and stream the
    /// response back.
    pub async fn forward(
        &self,
        workspace: &Workspace,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response, ApiError> {
        let base = self.base_url(workspace)?;
        let mut url = join_url(base, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(|e| ApiError::InvalidPayload(format!("Failed to read request body: {e}")))?;

        let mut forwarded = HeaderMap::new();
        for (name, value) in headers {
            if !is_stripped_request_header(name) {
                forwarded.append(name.clone(), value.clone());
            }
        }

        let mut builder = self.client.request(method.clone(), &url).headers(forwarded);
        builder = self.with_engine_auth(builder, workspace);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let upstream = builder.send().await.map_err(|e| {
            tracing::warn!(workspace = %workspace.id, url = %url, "Engine unreachable: {}", e);
            ApiError::OpencodeUnreachable(e.to_string())
        })?;

        tracing::debug!(
            workspace = %workspace.id,
            %method,
            path,
            status = upstream.status().as_u16(),
            "Proxied engine request"
        );

        let status = upstream.status();
        let mut response_headers = HeaderMap::new();
        for (name, value) in upstream.headers() {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    /// Ask the engine to drop its cached instance so it re-reads config.
    pub async fn reload(&self, workspace: &Workspace) -> Result<EngineReloadResult, ApiError> {
        let base = self.base_url(workspace)?;
        let url = join_url(base, "instance/dispose");
        let builder = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body("{}")
            .timeout(Duration::from_secs(15));
        let response = self
            .with_engine_auth(builder, workspace)
            .send()
            .await
            .map_err(|e| ApiError::OpencodeReloadFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(workspace = %workspace.id, status, "Engine reload failed");
            return Err(ApiError::OpencodeReloadFailed { status: Some(status), body });
        }
        tracing::info!(workspace = %workspace.id, "Engine reloaded");
        Ok(EngineReloadResult { ok: true, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_and_hop_by_hop_headers_are_stripped() {
        for name in [
            "authorization",
            "origin",
            "host",
            "x-openwork-host-token",
            "x-openwork-client-id",
            "connection",
            "transfer-encoding",
        ] {
            assert!(
                is_stripped_request_header(&HeaderName::from_static(name)),
                "{name} should be stripped"
            );
        }
        assert!(!is_stripped_request_header(&header::ACCEPT));
        assert!(!is_stripped_request_header(&header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn unconfigured_workspace_is_rejected() {
        let bridge = EngineBridge::new().unwrap();
        let workspace = Workspace::local("/tmp/none");
        let err = bridge.reload(&workspace).await.unwrap_err();
        assert_eq!(err.code().as_str(), "opencode_unconfigured");
    }
}
