//! Human-in-the-loop approval for mutating requests.
//!
//! In manual mode every write parks a pending request until the host replies
//! through `POST /approvals/{id}` or the timeout fires. A timeout always
//! denies. Each request resolves exactly once: the host reply and the timer
//! both race to remove the pending entry, and whoever removes it decides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::ApiError;

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Auto,
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct ApprovalConfig {
    pub mode: ApprovalMode,
    pub timeout: Duration,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::Manual,
            timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalOutcome {
    Pending,
    Allowed,
    Denied,
    TimedOut,
}

impl ApprovalOutcome {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalReply {
    Allow,
    Deny,
}

/// What the caller wants to do, before an id is assigned.
#[derive(Debug, Clone)]
pub struct ApprovalDraft {
    pub workspace_id: String,
    pub action: String,
    pub summary: String,
    pub affected_paths: Vec<String>,
    pub actor: Actor,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub workspace_id: String,
    pub action: String,
    pub summary: String,
    pub affected_paths: Vec<String>,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
    pub outcome: ApprovalOutcome,
}

struct Pending {
    request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalReply>,
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

/// Removes the pending entry if the waiting request future is dropped.
struct PendingGuard {
    pending: PendingMap,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if map.remove(&self.id).is_some() {
            tracing::debug!(approval = %self.id, "Dropped pending approval");
        }
    }
}

pub struct ApprovalService {
    config: ApprovalConfig,
    pending: PendingMap,
}

impl ApprovalService {
    pub fn new(config: ApprovalConfig) -> Self {
        Self {
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> ApprovalConfig {
        self.config
    }

    /// Ask for permission and wait for the decision.
    pub async fn request(&self, draft: ApprovalDraft) -> ApprovalRequest {
        let mut request = ApprovalRequest {
            id: format!("apr_{}", Uuid::new_v4().simple()),
            workspace_id: draft.workspace_id,
            action: draft.action,
            summary: draft.summary,
            affected_paths: draft.affected_paths,
            actor: draft.actor,
            created_at: Utc::now(),
            outcome: ApprovalOutcome::Pending,
        };

        if self.config.mode == ApprovalMode::Auto {
            request.outcome = ApprovalOutcome::Allowed;
            return request;
        }

        let id = request.id.clone();
        let (tx, mut rx) = oneshot::channel();
        self.lock().insert(
            id.clone(),
            Pending {
                request: request.clone(),
                responder: tx,
            },
        );
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            id: id.clone(),
        };
        tracing::info!(
            approval = %id,
            workspace = %request.workspace_id,
            action = %request.action,
            "Waiting for host approval"
        );

        request.outcome = match tokio::time::timeout(self.config.timeout, &mut rx).await {
            Ok(Ok(reply)) => outcome_for(reply),
            // Sender dropped without a reply.
            Ok(Err(_)) => ApprovalOutcome::Denied,
            Err(_) => {
                if self.lock().remove(&id).is_some() {
                    ApprovalOutcome::TimedOut
                } else {
                    // A reply removed the entry first and is about to send.
                    match rx.await {
                        Ok(reply) => outcome_for(reply),
                        Err(_) => ApprovalOutcome::TimedOut,
                    }
                }
            }
        };

        if request.outcome.is_allowed() {
            tracing::info!(approval = %id, "Approval granted");
        } else {
            tracing::warn!(approval = %id, outcome = ?request.outcome, "Approval not granted");
        }
        request
    }

    /// Deliver the host's decision. Unknown or already-resolved ids are
    /// `approval_not_found`.
    pub fn respond(&self, id: &str, reply: ApprovalReply) -> Result<ApprovalRequest, ApiError> {
        let pending = self
            .lock()
            .remove(id)
            .ok_or_else(|| ApiError::ApprovalNotFound(id.to_string()))?;

        let mut request = pending.request;
        if pending.responder.send(reply).is_err() {
            return Err(ApiError::ApprovalNotFound(id.to_string()));
        }
        request.outcome = outcome_for(reply);
        Ok(request)
    }

    /// Pending requests, oldest first.
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        let mut items: Vec<ApprovalRequest> =
            self.lock().values().map(|p| p.request.clone()).collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn outcome_for(reply: ApprovalReply) -> ApprovalOutcome {
    match reply {
        ApprovalReply::Allow => ApprovalOutcome::Allowed,
        ApprovalReply::Deny => ApprovalOutcome::Denied,
    }
}
