//! Engine and app config for one workspace.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::reload::{ReloadReason, ReloadTrigger};
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::state::{ChangeRecord, WriteIntent};
use crate::server::types::*;
use crate::store::WriteMode;

pub async fn config_get_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    Ok(Json(ConfigResponse {
        workspace_id: workspace.id().to_string(),
        opencode: store.read_engine_config().await?,
        openwork: store.read_app_config().await?,
        opencode_path: store.engine_config_path().display().to_string(),
        openwork_path: store.app_config_path().display().to_string(),
    }))
}

/// `opencode` keys are replaced one by one in place; `openwork` is merged or
/// replaced per `openworkMode`.
pub async fn config_patch_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<ConfigPatchRequest>,
) -> Result<Json<ConfigPatchResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);

    let opencode = req.opencode.filter(|patch| !patch.is_empty());
    if opencode.is_none() && req.openwork.is_none() {
        return Err(ApiError::InvalidPayload(
            "opencode or openwork is required".to_string(),
        ));
    }

    let mut summary = Vec::new();
    let mut intent = WriteIntent::new("config.patch", "");
    if let Some(patch) = &opencode {
        let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
        summary.push(format!("opencode keys: {}", keys.join(", ")));
        intent = intent.path(store.engine_config_path());
    }
    if req.openwork.is_some() {
        let mode = match req.openwork_mode {
            WriteMode::Merge => "merge",
            WriteMode::Replace => "replace",
        };
        summary.push(format!("openwork ({mode})"));
        intent = intent.path(store.app_config_path());
    }
    intent.summary = format!("Update config: {}", summary.join("; "));
    let summary = intent.summary.clone();

    state.authorize_write(&workspace, &actor, intent).await?;

    let mut updated = Vec::new();
    if let Some(patch) = &opencode {
        store.patch_engine_config(patch).await?;
        updated.push("opencode");
    }
    if let Some(app) = req.openwork {
        store.write_app_config(app, req.openwork_mode).await?;
        updated.push("openwork");
    }

    let mut change = ChangeRecord::new("config.patch", updated.join(","), summary);
    if opencode.is_some() {
        let path = store.engine_config_path();
        change = change.reload(
            ReloadReason::Config,
            ReloadTrigger::new("config", "opencode", "updated")
                .with_path(path.display().to_string()),
        );
    }
    let reload_event = state.record_change(&workspace, &actor, change).await;

    Ok(Json(ConfigPatchResponse {
        ok: true,
        updated,
        opencode: store.read_engine_config().await?,
        openwork: store.read_app_config().await?,
        reload_event,
    }))
}
