//! Engine passthrough and reload.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Request, State},
    response::Response,
};

use crate::auth::Actor;
use crate::engine::EngineReloadResult;
use crate::error::ApiError;
use crate::server::AppState;
use crate::server::extract::ApiPath;
use crate::server::state::{ChangeRecord, WriteIntent};
use crate::workspace::ResolvedWorkspace;

async fn forward(
    state: &AppState,
    workspace: &ResolvedWorkspace,
    path: &str,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    state
        .engine
        .forward(
            &workspace.workspace,
            parts.method,
            path,
            parts.uri.query(),
            &parts.headers,
            body,
        )
        .await
}

/// `/opencode/{*path}` against the active workspace.
pub async fn opencode_proxy_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(path): ApiPath<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let workspace = state.workspaces.resolve_active()?;
    forward(&state, &workspace, &path, request).await
}

pub async fn workspace_opencode_proxy_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((id, path)): ApiPath<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    forward(&state, &workspace, &path, request).await
}

pub async fn engine_reload_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<EngineReloadResult>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    if workspace.workspace.engine_base_url.is_none() {
        return Err(ApiError::OpencodeUnconfigured(workspace.id().to_string()));
    }

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("engine.reload", "Reload the opencode engine"),
        )
        .await?;

    let result = state.engine.reload(&workspace.workspace).await?;
    state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("engine.reload", workspace.id(), "Reloaded the opencode engine"),
        )
        .await;
    Ok(Json(result))
}
