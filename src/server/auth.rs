//! Per-tier auth middleware. Each route group gets one of these as a
//! `route_layer`; on success the caller's [`Actor`] is placed in the request
//! extensions for handlers to pick up.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use crate::auth::{Actor, AuthTier};
use crate::error::ApiError;

async fn authenticate(
    state: &AppState,
    tier: AuthTier,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor: Actor = state.authenticator.authenticate(tier, request.headers())?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

pub async fn require_client(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, AuthTier::Client, request, next).await
}

pub async fn require_host(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, AuthTier::Host, request, next).await
}
