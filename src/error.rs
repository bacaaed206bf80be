//! Error types for the OpenWork server.

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};

/// Stable machine-readable error codes returned in the API envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    Unauthorized,
    WorkspaceNotFound,
    ProviderNotFound,
    ApprovalNotFound,
    NotFound,
    MethodNotAllowed,
    WorkspaceUnauthorized,
    ReadOnly,
    WriteDenied,
    InvalidPayload,
    InvalidJson,
    InvalidProvider,
    ProviderMissingKey,
    TokenRequired,
    ProviderTestFailed,
    ProviderChatFailed,
    ProviderImageFailed,
    ProviderImageTimeout,
    OpencodeUnconfigured,
    OpencodeReloadFailed,
    OpencodeUnreachable,
    InternalError,
}

impl ApiErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::WorkspaceNotFound => "workspace_not_found",
            Self::ProviderNotFound => "provider_not_found",
            Self::ApprovalNotFound => "approval_not_found",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::WorkspaceUnauthorized => "workspace_unauthorized",
            Self::ReadOnly => "read_only",
            Self::WriteDenied => "write_denied",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidJson => "invalid_json",
            Self::InvalidProvider => "invalid_provider",
            Self::ProviderMissingKey => "provider_missing_key",
            Self::TokenRequired => "token_required",
            Self::ProviderTestFailed => "provider_test_failed",
            Self::ProviderChatFailed => "provider_chat_failed",
            Self::ProviderImageFailed => "provider_image_failed",
            Self::ProviderImageTimeout => "provider_image_timeout",
            Self::OpencodeUnconfigured => "opencode_unconfigured",
            Self::OpencodeReloadFailed => "opencode_reload_failed",
            Self::OpencodeUnreachable => "opencode_unreachable",
            Self::InternalError => "internal_error",
        }
    }

    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::WorkspaceNotFound
            | Self::ProviderNotFound
            | Self::ApprovalNotFound
            | Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::WorkspaceUnauthorized | Self::ReadOnly | Self::WriteDenied => {
                StatusCode::FORBIDDEN
            }
            Self::InvalidPayload
            | Self::InvalidJson
            | Self::InvalidProvider
            | Self::ProviderMissingKey
            | Self::TokenRequired
            | Self::OpencodeUnconfigured => StatusCode::BAD_REQUEST,
            Self::ProviderTestFailed
            | Self::ProviderChatFailed
            | Self::ProviderImageFailed
            | Self::OpencodeReloadFailed
            | Self::OpencodeUnreachable => StatusCode::BAD_GATEWAY,
            Self::ProviderImageTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Request-level error. Every handler failure ends up here and is rendered
/// as an [`ErrorEnvelope`] at the router boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    TokenRequired(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Workspace path is outside the authorized roots: {0}")]
    WorkspaceUnauthorized(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {0} has no stored API key")]
    ProviderMissingKey(String),

    #[error("{0}")]
    InvalidProvider(String),

    #[error("Approval request not found: {0}")]
    ApprovalNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method {method} is not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("Server is running in read-only mode")]
    ReadOnly,

    #[error("Write denied: {reason}")]
    WriteDenied {
        request_id: Option<String>,
        reason: String,
    },

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Provider test failed: {message}")]
    ProviderTestFailed { status: u16, message: String },

    #[error("Provider chat request failed: {message}")]
    ProviderChatFailed { status: u16, message: String },

    #[error("Provider image request failed: {message}")]
    ProviderImageFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Image task {task_id} did not finish after {attempts} polls")]
    ProviderImageTimeout { task_id: String, attempts: u32 },

    #[error("No opencode base URL configured for workspace {0}")]
    OpencodeUnconfigured(String),

    #[error("opencode reload failed")]
    OpencodeReloadFailed { status: Option<u16>, body: String },

    #[error("opencode is unreachable: {0}")]
    OpencodeUnreachable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ApiErrorCode {
        match self {
            Self::Unauthorized => ApiErrorCode::Unauthorized,
            Self::TokenRequired(_) => ApiErrorCode::TokenRequired,
            Self::WorkspaceNotFound(_) => ApiErrorCode::WorkspaceNotFound,
            Self::WorkspaceUnauthorized(_) => ApiErrorCode::WorkspaceUnauthorized,
            Self::ProviderNotFound(_) => ApiErrorCode::ProviderNotFound,
            Self::ProviderMissingKey(_) => ApiErrorCode::ProviderMissingKey,
            Self::InvalidProvider(_) => ApiErrorCode::InvalidProvider,
            Self::ApprovalNotFound(_) => ApiErrorCode::ApprovalNotFound,
            Self::NotFound(_) => ApiErrorCode::NotFound,
            Self::MethodNotAllowed { .. } => ApiErrorCode::MethodNotAllowed,
            Self::ReadOnly => ApiErrorCode::ReadOnly,
            Self::WriteDenied { .. } => ApiErrorCode::WriteDenied,
            Self::InvalidPayload(_) => ApiErrorCode::InvalidPayload,
            Self::InvalidJson(_) => ApiErrorCode::InvalidJson,
            Self::ProviderTestFailed { .. } => ApiErrorCode::ProviderTestFailed,
            Self::ProviderChatFailed { .. } => ApiErrorCode::ProviderChatFailed,
            Self::ProviderImageFailed { .. } => ApiErrorCode::ProviderImageFailed,
            Self::ProviderImageTimeout { .. } => ApiErrorCode::ProviderImageTimeout,
            Self::OpencodeUnconfigured(_) => ApiErrorCode::OpencodeUnconfigured,
            Self::OpencodeReloadFailed { .. } => ApiErrorCode::OpencodeReloadFailed,
            Self::OpencodeUnreachable(_) => ApiErrorCode::OpencodeUnreachable,
            Self::Store(err) => err.api_code(),
            Self::Internal(_) => ApiErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // Upstream failures pass the provider's status through when it is
            // itself an error status.
            Self::ProviderTestFailed { status, .. } | Self::ProviderChatFailed { status, .. } => {
                upstream_status(Some(*status), self.code())
            }
            Self::ProviderImageFailed { status, .. } => upstream_status(*status, self.code()),
            _ => self.code().default_status(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::WriteDenied { request_id, reason } => Some(json!({
                "requestId": request_id,
                "reason": reason,
            })),
            Self::ProviderTestFailed { status, .. } | Self::ProviderChatFailed { status, .. } => {
                Some(json!({ "status": status }))
            }
            Self::ProviderImageFailed {
                status: Some(status),
                ..
            } => Some(json!({ "status": status })),
            Self::ProviderImageTimeout { task_id, attempts } => Some(json!({
                "taskId": task_id,
                "attempts": attempts,
            })),
            Self::OpencodeReloadFailed { status, body } => Some(json!({
                "status": status,
                "body": body,
            })),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let message = match self {
            // Internal detail stays in the log, not on the wire.
            Self::Internal(_) | Self::Store(StoreError::Io { .. }) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        ErrorEnvelope {
            code: self.code().as_str(),
            message,
            details: self.details(),
        }
    }
}

fn upstream_status(status: Option<u16>, code: ApiErrorCode) -> StatusCode {
    status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or_else(|| code.default_status())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code().as_str(), "Request failed: {}", self);
        } else {
            tracing::debug!(code = self.code().as_str(), "Request rejected: {}", self);
        }
        (status, Json(self.envelope())).into_response()
    }
}

/// Filesystem store errors (config files, skills, commands, audit log).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn api_code(&self) -> ApiErrorCode {
        match self {
            Self::Io { .. } => ApiErrorCode::InternalError,
            Self::Parse { .. } | Self::Invalid(_) => ApiErrorCode::InvalidPayload,
            Self::NotFound(_) => ApiErrorCode::NotFound,
        }
    }
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server failed to start: {reason}")]
    StartupFailed { reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
