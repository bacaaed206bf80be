//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::approval::{ApprovalMode, ApprovalOutcome, ApprovalReply, ApprovalRequest};
use crate::audit::AuditEntry;
use crate::extensions::commands::{CommandBundle, CommandOptions, CommandSummary};
use crate::extensions::skills::{SkillBundle, SkillSummary};
use crate::providers::ProviderSummary;
use crate::reload::ReloadEvent;
use crate::store::WriteMode;
use crate::workspace::{Workspace, WorkspaceKind};

// --- System ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInfo {
    pub mode: ApprovalMode,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ok: bool,
    pub version: &'static str,
    pub uptime_ms: u64,
    pub read_only: bool,
    pub approval: ApprovalInfo,
    pub workspace_count: usize,
    pub active_workspace_id: Option<String>,
    pub pending_approvals: usize,
    pub reload_cursor: u64,
}

#[derive(Debug, Serialize)]
pub struct SurfaceCapability {
    pub read: bool,
    pub write: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCapability {
    pub opencode: bool,
    pub chat: bool,
    pub images: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub read_only: bool,
    pub approval: ApprovalInfo,
    pub config: SurfaceCapability,
    pub plugins: SurfaceCapability,
    pub skills: SurfaceCapability,
    pub commands: SurfaceCapability,
    pub mcp: SurfaceCapability,
    pub transfer: SurfaceCapability,
    pub engine_reload: bool,
    pub proxy: ProxyCapability,
}

// --- Workspaces ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    pub path: String,
    pub workspace_type: WorkspaceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    pub has_engine_credentials: bool,
}

impl From<&Workspace> for WorkspaceInfo {
    fn from(workspace: &Workspace) -> Self {
        Self {
            id: workspace.id.clone(),
            name: workspace.display_name.clone(),
            path: workspace.path.display().to_string(),
            workspace_type: workspace.kind,
            base_url: workspace.engine_base_url.clone(),
            directory: workspace.engine_directory.clone(),
            has_engine_credentials: workspace.engine_credentials.is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceListResponse {
    pub active_id: Option<String>,
    pub items: Vec<WorkspaceInfo>,
}

impl WorkspaceListResponse {
    /// `order` is active-first.
    pub fn from_order(order: &[Workspace]) -> Self {
        Self {
            active_id: order.first().map(|w| w.id.clone()),
            items: order.iter().map(WorkspaceInfo::from).collect(),
        }
    }
}

// --- Config ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub workspace_id: String,
    pub opencode: Map<String, Value>,
    pub openwork: Map<String, Value>,
    pub opencode_path: String,
    pub openwork_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatchRequest {
    #[serde(default)]
    pub opencode: Option<Map<String, Value>>,
    #[serde(default)]
    pub openwork: Option<Map<String, Value>>,
    #[serde(default)]
    pub openwork_mode: WriteMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatchResponse {
    pub ok: bool,
    pub updated: Vec<&'static str>,
    pub opencode: Map<String, Value>,
    pub openwork: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_event: Option<ReloadEvent>,
}

// --- Extensions ---

#[derive(Debug, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResponse<T> {
    pub ok: bool,
    pub changed: bool,
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_event: Option<ReloadEvent>,
}

#[derive(Debug, Deserialize)]
pub struct PluginAddRequest {
    pub spec: String,
}

#[derive(Debug, Deserialize)]
pub struct McpAddRequest {
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct SkillUpsertRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Either a raw `content` file (frontmatter included) or a `template` plus
/// options.
#[derive(Debug, Deserialize)]
pub struct CommandUpsertRequest {
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(flatten)]
    pub options: CommandOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub ok: bool,
    pub name: String,
    pub path: String,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_event: Option<ReloadEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResponse {
    pub ok: bool,
    pub name: String,
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_event: Option<ReloadEvent>,
}

pub type SkillListResponse = ItemsResponse<SkillSummary>;
pub type CommandListResponse = ItemsResponse<CommandSummary>;

// --- Activity ---

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub type AuditResponse = ItemsResponse<AuditEntry>;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: Option<u64>,
}

// --- Approvals ---

pub type ApprovalListResponse = ItemsResponse<ApprovalRequest>;

#[derive(Debug, Deserialize)]
pub struct ApprovalReplyRequest {
    pub reply: ApprovalReply,
}

#[derive(Debug, Serialize)]
pub struct ApprovalReplyResponse {
    pub ok: bool,
    pub id: String,
    pub reply: ApprovalReply,
    pub outcome: ApprovalOutcome,
}

// --- Providers ---

pub type ProviderListResponse = ItemsResponse<ProviderSummary>;

// --- Export / import ---

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceExport {
    pub version: u32,
    pub workspace_id: String,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub opencode: Map<String, Value>,
    pub openwork: Map<String, Value>,
    pub skills: Vec<SkillBundle>,
    pub commands: Vec<CommandBundle>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ImportModes {
    pub opencode: WriteMode,
    pub openwork: WriteMode,
    pub skills: WriteMode,
    pub commands: WriteMode,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub opencode: Option<Map<String, Value>>,
    #[serde(default)]
    pub openwork: Option<Map<String, Value>>,
    #[serde(default)]
    pub skills: Option<Vec<SkillBundle>>,
    #[serde(default)]
    pub commands: Option<Vec<CommandBundle>>,
    #[serde(default)]
    pub mode: ImportModes,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub opencode: bool,
    pub openwork: bool,
    pub skills: Vec<String>,
    pub commands: Vec<String>,
    pub removed_skills: Vec<String>,
    pub removed_commands: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub ok: bool,
    pub imported: ImportSummary,
    pub reload_events: Vec<ReloadEvent>,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    #[test]
    fn workspace_list_puts_active_first() {
        let order = vec![
            Workspace::local(PathBuf::from("/work/b")),
            Workspace::local(PathBuf::from("/work/a")),
        ];
        let value = serde_json::to_value(WorkspaceListResponse::from_order(&order)).unwrap();
        assert_eq!(value["activeId"], json!(order[0].id));
        assert_eq!(value["items"][0]["name"], "b");
        assert_eq!(value["items"][0]["workspaceType"], "local");
        assert!(value["items"][0].get("baseUrl").is_none());
    }

    #[test]
    fn command_request_accepts_template_with_options() {
        let req: CommandUpsertRequest = serde_json::from_value(json!({
            "name": "review",
            "template": "Review $ARGUMENTS",
            "description": "Code review",
            "subtask": true
        }))
        .unwrap();
        assert_eq!(req.template.as_deref(), Some("Review $ARGUMENTS"));
        assert_eq!(req.options.description.as_deref(), Some("Code review"));
        assert_eq!(req.options.subtask, Some(true));
        assert!(req.content.is_none());
    }

    #[test]
    fn import_modes_default_to_merge() {
        let req: ImportRequest =
            serde_json::from_value(json!({ "mode": { "skills": "replace" } })).unwrap();
        assert_eq!(req.mode.skills, WriteMode::Replace);
        assert_eq!(req.mode.commands, WriteMode::Merge);
        assert_eq!(req.mode.opencode, WriteMode::Merge);
    }
}
