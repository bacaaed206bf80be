//! Health, status and capabilities.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::server::AppState;
use crate::server::types::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn approval_info(state: &AppState) -> ApprovalInfo {
    let config = state.approvals.config();
    ApprovalInfo {
        mode: config.mode,
        timeout_ms: u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: VERSION,
        uptime_ms: state.uptime_ms(),
    })
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ok: true,
        version: VERSION,
        uptime_ms: state.uptime_ms(),
        read_only: state.read_only,
        approval: approval_info(&state),
        workspace_count: state.workspaces.len(),
        active_workspace_id: state.workspaces.active().map(|w| w.id),
        pending_approvals: state.approvals.pending_count(),
        reload_cursor: state.reload_events.latest_cursor(),
    })
}

pub async fn capabilities_handler(
    State(state): State<Arc<AppState>>,
) -> Json<CapabilitiesResponse> {
    let writable = !state.read_only;
    let surface = || SurfaceCapability {
        read: true,
        write: writable,
    };
    let engine_configured = state
        .workspaces
        .active()
        .is_some_and(|w| w.engine_base_url.is_some());

    Json(CapabilitiesResponse {
        read_only: state.read_only,
        approval: approval_info(&state),
        config: surface(),
        plugins: surface(),
        skills: surface(),
        commands: surface(),
        mcp: surface(),
        transfer: surface(),
        engine_reload: writable && engine_configured,
        proxy: ProxyCapability {
            opencode: engine_configured,
            chat: true,
            images: true,
        },
    })
}
