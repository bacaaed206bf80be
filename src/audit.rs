//! Append-only audit trail, one JSONL file per workspace.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::StoreError;

pub const AUDIT_FILE: &str = ".opencode/openwork/audit.jsonl";
pub const MAX_AUDIT_LIMIT: usize = 200;
pub const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub workspace_id: String,
    pub actor: Actor,
    pub action: String,
    pub target: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        workspace_id: impl Into<String>,
        actor: &Actor,
        action: impl Into<String>,
        target: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("aud_{}", Uuid::new_v4().simple()),
            workspace_id: workspace_id.into(),
            actor: actor.clone(),
            action: action.into(),
            target: target.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}

pub fn audit_path(root: &Path) -> PathBuf {
    root.join(AUDIT_FILE)
}

/// Appends are serialized through one lock so entries land in call order.
#[derive(Default)]
pub struct AuditLog {
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, root: &Path, entry: &AuditEntry) -> Result<(), StoreError> {
        let path = audit_path(root);
        let mut line =
            serde_json::to_string(entry).map_err(|e| StoreError::Invalid(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    /// The most recent `limit` entries (capped at [`MAX_AUDIT_LIMIT`]), oldest
    /// first. Malformed lines are skipped.
    pub async fn read_entries(
        &self,
        root: &Path,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let limit = limit.min(MAX_AUDIT_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let path = audit_path(root);
        let Some(text) = crate::store::read_optional(&path).await? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<AuditEntry> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Skipping malformed audit line: {}", e);
                    None
                }
            })
            .collect();

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }
}
