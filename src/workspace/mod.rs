//! Workspace registry and the authorized-roots boundary.
//!
//! Workspaces come from startup configuration and are never created or
//! deleted over the API. The only mutation is [`WorkspaceRegistry::activate`],
//! which moves a workspace to the front of the ordered list.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    #[default]
    Local,
    Remote,
}

/// Basic-auth credentials for the workspace's engine instance.
#[derive(Debug, Clone)]
pub struct EngineCredentials {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: String,
    pub display_name: String,
    pub path: PathBuf,
    pub kind: WorkspaceKind,
    pub engine_base_url: Option<String>,
    pub engine_directory: Option<String>,
    pub engine_credentials: Option<EngineCredentials>,
}

impl Workspace {
    /// A local workspace with an id derived from its path.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: stable_workspace_id(&path),
            display_name,
            path,
            kind: WorkspaceKind::Local,
            engine_base_url: None,
            engine_directory: None,
            engine_credentials: None,
        }
    }
}

/// A workspace whose path has been canonicalized and checked against the
/// authorized roots.
#[derive(Debug, Clone)]
pub struct ResolvedWorkspace {
    pub workspace: Workspace,
    pub root: PathBuf,
}

impl ResolvedWorkspace {
    pub fn id(&self) -> &str {
        &self.workspace.id
    }
}

/// `ws_` plus the first 12 hex chars of the SHA-256 of the path.
pub fn stable_workspace_id(path: &Path) -> String {
    let digest = format!("{:x}", Sha256::digest(path.to_string_lossy().as_bytes()));
    format!("ws_{}", &digest[..12])
}

/// True when `path` equals a root or sits below one. Comparison is by path
/// component, so `/work` does not cover `/workspace-other`.
pub fn is_within_roots(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub struct WorkspaceRegistry {
    order: RwLock<Vec<Workspace>>,
    authorized_roots: Vec<PathBuf>,
}

impl WorkspaceRegistry {
    /// Build the registry. With no explicit roots, each workspace path is its
    /// own root.
    pub fn new(workspaces: Vec<Workspace>, authorized_roots: Vec<PathBuf>) -> Self {
        let roots = if authorized_roots.is_empty() {
            workspaces.iter().map(|w| canonical_or_raw(&w.path)).collect()
        } else {
            authorized_roots.iter().map(|r| canonical_or_raw(r)).collect()
        };
        Self {
            order: RwLock::new(workspaces),
            authorized_roots: roots,
        }
    }

    pub fn authorized_roots(&self) -> &[PathBuf] {
        &self.authorized_roots
    }

    /// Snapshot in active-first order.
    pub fn list(&self) -> Vec<Workspace> {
        self.order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.order.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active(&self) -> Option<Workspace> {
        self.order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .cloned()
    }

    pub fn get(&self, id: &str) -> Result<Workspace, ApiError> {
        self.order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| ApiError::WorkspaceNotFound(id.to_string()))
    }

    /// Look up `id`, canonicalize its path and enforce the root boundary.
    pub fn resolve(&self, id: &str) -> Result<ResolvedWorkspace, ApiError> {
        let workspace = self.get(id)?;
        self.check(workspace)
    }

    pub fn resolve_active(&self) -> Result<ResolvedWorkspace, ApiError> {
        let workspace = self
            .active()
            .ok_or_else(|| ApiError::WorkspaceNotFound("no active workspace".to_string()))?;
        self.check(workspace)
    }

    fn check(&self, workspace: Workspace) -> Result<ResolvedWorkspace, ApiError> {
        let root = canonical_or_raw(&workspace.path);
        if !is_within_roots(&root, &self.authorized_roots) {
            tracing::warn!(
                workspace = %workspace.id,
                path = %root.display(),
                "Workspace path is outside the authorized roots"
            );
            return Err(ApiError::WorkspaceUnauthorized(workspace.id));
        }
        Ok(ResolvedWorkspace { workspace, root })
    }

    /// Move `id` to the front and return the new order.
    pub fn activate(&self, id: &str) -> Result<Vec<Workspace>, ApiError> {
        let mut order = self.order.write().unwrap_or_else(|e| e.into_inner());
        let index = order
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| ApiError::WorkspaceNotFound(id.to_string()))?;
        let workspace = order.remove(index);
        order.insert(0, workspace);
        Ok(order.clone())
    }
}
