//! Audit trail and reload event feed.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
};

use crate::audit::DEFAULT_AUDIT_LIMIT;
use crate::error::ApiError;
use crate::reload::ReloadEventPage;
use crate::server::AppState;
use crate::server::extract::{ApiPath, ApiQuery};
use crate::server::types::*;

pub async fn audit_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let items = state
        .audit
        .read_entries(&workspace.root, query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
        .await?;
    Ok(Json(ItemsResponse { items }))
}

/// Events newer than `since`, for clients polling to know when to reload.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> Result<Json<ReloadEventPage>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    Ok(Json(state.reload_events.list(workspace.id(), query.since)))
}
