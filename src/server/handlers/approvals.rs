//! Host-side approval queue.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::types::*;

pub async fn approvals_list_handler(
    State(state): State<Arc<AppState>>,
) -> Json<ApprovalListResponse> {
    Json(ItemsResponse {
        items: state.approvals.list_pending(),
    })
}

pub async fn approvals_reply_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<ApprovalReplyRequest>,
) -> Result<Json<ApprovalReplyResponse>, ApiError> {
    let request = state.approvals.respond(&id, req.reply)?;
    tracing::info!(
        approval = %id,
        reply = ?req.reply,
        actor = ?actor.kind,
        "Host replied to approval"
    );
    Ok(Json(ApprovalReplyResponse {
        ok: true,
        id: request.id,
        reply: req.reply,
        outcome: request.outcome,
    }))
}
