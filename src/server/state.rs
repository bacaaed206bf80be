//! Shared state behind every handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::approval::{ApprovalDraft, ApprovalService};
use crate::audit::{AuditEntry, AuditLog};
use crate::auth::{Actor, Authenticator};
use crate::config::ServerConfig;
use crate::engine::EngineBridge;
use crate::error::ApiError;
use crate::providers::{ProviderProxy, ProviderRegistry};
use crate::reload::{ReloadEvent, ReloadEventStore, ReloadReason, ReloadTrigger};
use crate::store::ConfigStore;
use crate::workspace::{ResolvedWorkspace, WorkspaceRegistry};

pub struct AppState {
    pub authenticator: Authenticator,
    pub workspaces: WorkspaceRegistry,
    pub approvals: ApprovalService,
    pub audit: AuditLog,
    pub reload_events: Arc<ReloadEventStore>,
    pub providers: ProviderProxy,
    pub engine: EngineBridge,
    pub read_only: bool,
    pub cors_origins: Vec<String>,
    pub started_at: Instant,
}

/// A mutation waiting to be authorized.
pub struct WriteIntent {
    pub action: &'static str,
    pub summary: String,
    pub paths: Vec<PathBuf>,
}

impl WriteIntent {
    pub fn new(action: &'static str, summary: impl Into<String>) -> Self {
        Self {
            action,
            summary: summary.into(),
            paths: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }
}

/// A completed mutation: what goes into the audit log, and the reload event
/// to publish if the engine has to pick the change up.
pub struct ChangeRecord {
    pub action: &'static str,
    pub target: String,
    pub summary: String,
    pub reload: Option<(ReloadReason, ReloadTrigger)>,
}

impl ChangeRecord {
    pub fn new(action: &'static str, target: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            summary: summary.into(),
            reload: None,
        }
    }

    pub fn reload(mut self, reason: ReloadReason, trigger: ReloadTrigger) -> Self {
        self.reload = Some((reason, trigger));
        self
    }
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        let providers =
            ProviderProxy::new(ProviderRegistry::new(&config.data_dir), config.image_poll)?;
        Self::with_providers(config, providers)
    }

    /// Build state around an already constructed provider proxy (tests swap
    /// in one with a recording sleeper).
    pub fn with_providers(config: &ServerConfig, providers: ProviderProxy) -> Result<Self, ApiError> {
        Ok(Self {
            authenticator: Authenticator::new(
                config.client_token.clone(),
                config.host_token.clone(),
            ),
            workspaces: WorkspaceRegistry::new(
                config.workspaces.clone(),
                config.authorized_roots.clone(),
            ),
            approvals: ApprovalService::new(config.approval),
            audit: AuditLog::new(),
            reload_events: Arc::new(ReloadEventStore::new()),
            providers,
            engine: EngineBridge::new()?,
            read_only: config.read_only,
            cors_origins: config.cors_origins.clone(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn store(&self, workspace: &ResolvedWorkspace) -> ConfigStore {
        ConfigStore::new(&workspace.root)
    }

    /// Gate a mutation: refused outright in read-only mode, otherwise it
    /// waits on the approval service.
    pub async fn authorize_write(
        &self,
        workspace: &ResolvedWorkspace,
        actor: &Actor,
        intent: WriteIntent,
    ) -> Result<(), ApiError> {
        if self.read_only {
            return Err(ApiError::ReadOnly);
        }

        let request = self
            .approvals
            .request(ApprovalDraft {
                workspace_id: workspace.id().to_string(),
                action: intent.action.to_string(),
                summary: intent.summary,
                affected_paths: intent
                    .paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
                actor: actor.clone(),
            })
            .await;

        if request.outcome.is_allowed() {
            Ok(())
        } else {
            let reason = match request.outcome {
                crate::approval::ApprovalOutcome::TimedOut => "timeout",
                _ => "denied",
            };
            Err(ApiError::WriteDenied {
                request_id: Some(request.id),
                reason: reason.to_string(),
            })
        }
    }

    /// Audit a completed mutation and publish its reload event, if any.
    /// Audit failures are logged; the mutation itself already happened.
    pub async fn record_change(
        &self,
        workspace: &ResolvedWorkspace,
        actor: &Actor,
        change: ChangeRecord,
    ) -> Option<ReloadEvent> {
        let entry = AuditEntry::new(
            workspace.id(),
            actor,
            change.action,
            change.target,
            change.summary,
        );
        if let Err(e) = self.audit.append(&workspace.root, &entry).await {
            tracing::warn!(
                workspace = %workspace.id(),
                action = change.action,
                "Failed to append audit entry: {}",
                e
            );
        }

        change
            .reload
            .map(|(reason, trigger)| self.reload_events.record(workspace.id(), reason, trigger))
    }
}
