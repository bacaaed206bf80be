//! HTTP control plane.
//!
//! One axum router, split into a sub-router per auth tier: `/health` is
//! public, host-token routes cover approvals and workspace activation, and
//! everything else needs the client bearer token.

pub mod auth;
pub mod cors;
pub mod extract;
pub mod handlers;
pub mod state;
pub mod types;

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ServerError};

pub use self::state::AppState;
use self::handlers::{
    activity::*, approvals::*, config::*, engine::*, extensions::*, providers::*, system::*,
    transfer::*, workspaces::*,
};

/// JSON request bodies (chat and image payloads included).
const MAX_JSON_BODY: usize = 8 * 1024 * 1024;

/// Build the full router. Exposed separately from [`start_server`] so tests
/// can drive it with `tower::ServiceExt::oneshot`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new().route("/health", get(health_handler));

    let host = Router::new()
        .route("/approvals", get(approvals_list_handler))
        .route("/approvals/{id}", post(approvals_reply_handler))
        .route(
            "/workspaces/{id}/activate",
            post(workspaces_activate_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_host,
        ));

    let client = Router::new()
        .route("/status", get(status_handler))
        .route("/capabilities", get(capabilities_handler))
        // Providers
        .route("/providers", get(providers_list_handler))
        .route("/providers/{id}/test", post(providers_test_handler))
        .route("/proxy/chat", post(proxy_chat_handler))
        .route("/proxy/images", post(proxy_images_handler))
        // Workspaces
        .route("/workspaces", get(workspaces_list_handler))
        .route(
            "/workspace/{id}/config",
            get(config_get_handler).patch(config_patch_handler),
        )
        .route(
            "/workspace/{id}/plugins",
            get(plugins_list_handler).post(plugins_add_handler),
        )
        .route(
            "/workspace/{id}/plugins/{name}",
            axum::routing::delete(plugins_remove_handler),
        )
        .route(
            "/workspace/{id}/skills",
            get(skills_list_handler).post(skills_upsert_handler),
        )
        .route(
            "/workspace/{id}/skills/{name}",
            axum::routing::delete(skills_remove_handler),
        )
        .route(
            "/workspace/{id}/commands",
            get(commands_list_handler).post(commands_upsert_handler),
        )
        .route(
            "/workspace/{id}/commands/{name}",
            axum::routing::delete(commands_remove_handler),
        )
        .route(
            "/workspace/{id}/mcp",
            get(mcp_list_handler).post(mcp_add_handler),
        )
        .route(
            "/workspace/{id}/mcp/{name}",
            axum::routing::delete(mcp_remove_handler),
        )
        .route("/workspace/{id}/audit", get(audit_handler))
        .route("/workspace/{id}/events", get(events_handler))
        .route("/workspace/{id}/engine/reload", post(engine_reload_handler))
        .route("/workspace/{id}/export", get(export_handler))
        .route("/workspace/{id}/import", post(import_handler))
        // Engine passthrough
        .route("/opencode/{*path}", any(opencode_proxy_handler))
        .route(
            "/workspace/{id}/opencode/{*path}",
            any(workspace_opencode_proxy_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_client,
        ));

    let cors = cors::cors_layer(&state.cors_origins);

    Router::new()
        .merge(public)
        .merge(host)
        .merge(client)
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .layer(DefaultBodyLimit::max(MAX_JSON_BODY))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

async fn method_not_allowed_handler(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("Handler panicked: {detail}")).into_response()
}

/// A running server. Dropping the handle does not stop it; call
/// [`ServerHandle::shutdown`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
}

/// Bind `addr` and serve in a background task.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<ServerHandle, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let app = build_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("OpenWork server shutting down");
            })
            .await
        {
            tracing::error!("OpenWork server error: {}", e);
        }
    });

    tracing::info!(addr = %local_addr, "OpenWork server listening");
    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}
