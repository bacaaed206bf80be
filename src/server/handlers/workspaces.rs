//! Workspace listing and activation.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::server::AppState;
use crate::server::extract::ApiPath;
use crate::server::state::ChangeRecord;
use crate::server::types::*;

pub async fn workspaces_list_handler(
    State(state): State<Arc<AppState>>,
) -> Json<WorkspaceListResponse> {
    Json(WorkspaceListResponse::from_order(&state.workspaces.list()))
}

/// Host only. Moves the workspace to the front of the order.
pub async fn workspaces_activate_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<WorkspaceListResponse>, ApiError> {
    let order = state.workspaces.activate(&id)?;
    tracing::info!(workspace = %id, "Activated workspace");

    // Only a workspace inside the roots gets an audit file written to it.
    match state.workspaces.resolve(&id) {
        Ok(workspace) => {
            state
                .record_change(
                    &workspace,
                    &actor,
                    ChangeRecord::new("workspace.activate", &id, "Activated workspace"),
                )
                .await;
        }
        Err(e) => tracing::warn!(workspace = %id, "Activated workspace is not auditable: {}", e),
    }

    Ok(Json(WorkspaceListResponse::from_order(&order)))
}
