//! Plugins, skills, commands and MCP connectors.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::extensions::commands::{self, CommandWrite};
use crate::extensions::mcp::{self, McpEntry};
use crate::extensions::plugins::{self, PluginEntry};
use crate::extensions::skills::{self, SkillWrite};
use crate::reload::{ReloadReason, ReloadTrigger};
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::state::{ChangeRecord, WriteIntent};
use crate::server::types::*;

fn display(path: &FsPath) -> String {
    path.display().to_string()
}

fn upsert_action(created: bool) -> &'static str {
    if created { "added" } else { "updated" }
}

// --- Plugins ---

pub async fn plugins_list_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ItemsResponse<PluginEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let items = plugins::list_plugins(&state.store(&workspace)).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn plugins_add_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<PluginAddRequest>,
) -> Result<Json<ChangeResponse<PluginEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    let spec = req.spec.trim().to_string();
    if spec.is_empty() {
        return Err(ApiError::InvalidPayload("plugin spec is required".to_string()));
    }

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("plugins.add", format!("Add plugin {spec}"))
                .path(store.engine_config_path()),
        )
        .await?;

    let change = plugins::add_plugin(&store, &spec).await?;
    let reload_event = if change.changed {
        let name = plugins::plugin_name(&spec);
        state
            .record_change(
                &workspace,
                &actor,
                ChangeRecord::new("plugins.add", &spec, format!("Added plugin {spec}")).reload(
                    ReloadReason::Plugins,
                    ReloadTrigger::new("plugin", name, "added")
                        .with_path(display(&store.engine_config_path())),
                ),
            )
            .await
    } else {
        None
    };

    Ok(Json(ChangeResponse {
        ok: true,
        changed: change.changed,
        items: change.items,
        reload_event,
    }))
}

pub async fn plugins_remove_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath((id, name)): ApiPath<(String, String)>,
) -> Result<Json<ChangeResponse<PluginEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    plugins::require_plugin(&store, &name).await?;

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("plugins.remove", format!("Remove plugin {name}"))
                .path(store.engine_config_path()),
        )
        .await?;

    let change = plugins::remove_plugin(&store, &name).await?;
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("plugins.remove", &name, format!("Removed plugin {name}")).reload(
                ReloadReason::Plugins,
                ReloadTrigger::new("plugin", plugins::plugin_name(&name), "removed")
                    .with_path(display(&store.engine_config_path())),
            ),
        )
        .await;

    Ok(Json(ChangeResponse {
        ok: true,
        changed: change.changed,
        items: change.items,
        reload_event,
    }))
}

// --- Skills ---

pub async fn skills_list_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<SkillListResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let items = skills::list_skills(&workspace.root).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn skills_upsert_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<SkillUpsertRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let name = skills::validate_skill_name(&req.name)?;
    let target = workspace
        .root
        .join(skills::SKILLS_DIR)
        .join(&name)
        .join(skills::SKILL_FILE);

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("skills.upsert", format!("Write skill {name}")).path(&target),
        )
        .await?;

    let SkillWrite { path, created } = skills::upsert_skill(
        &workspace.root,
        &name,
        &req.content,
        req.description.as_deref(),
    )
    .await?;
    let action = upsert_action(created);
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("skills.upsert", &name, format!("Skill {name} {action}")).reload(
                ReloadReason::Skills,
                ReloadTrigger::new("skill", &name, action).with_path(display(&path)),
            ),
        )
        .await;

    Ok(Json(WriteResponse {
        ok: true,
        name,
        path: display(&path),
        created,
        reload_event,
    }))
}

pub async fn skills_remove_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath((id, name)): ApiPath<(String, String)>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let name = skills::validate_skill_name(&name)?;

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("skills.remove", format!("Delete skill {name}"))
                .path(workspace.root.join(skills::SKILLS_DIR).join(&name)),
        )
        .await?;

    let removed: Vec<String> = skills::remove_skill(&workspace.root, &name)
        .await?
        .iter()
        .map(|p| display(p))
        .collect();
    let mut trigger = ReloadTrigger::new("skill", &name, "removed");
    if let Some(first) = removed.first() {
        trigger = trigger.with_path(first.clone());
    }
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("skills.remove", &name, format!("Skill {name} removed"))
                .reload(ReloadReason::Skills, trigger),
        )
        .await;

    Ok(Json(RemoveResponse {
        ok: true,
        name,
        removed,
        reload_event,
    }))
}

// --- Commands ---

pub async fn commands_list_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<CommandListResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let items = commands::list_commands(&workspace.root).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn commands_upsert_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<CommandUpsertRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let name = commands::validate_command_name(&req.name)?;
    if req.content.is_none() && req.template.is_none() {
        return Err(ApiError::InvalidPayload(
            "command content or template is required".to_string(),
        ));
    }
    let target = workspace
        .root
        .join(commands::COMMANDS_DIR)
        .join(format!("{name}.md"));

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("commands.upsert", format!("Write command {name}")).path(&target),
        )
        .await?;

    let CommandWrite { path, created } = match &req.content {
        Some(content) => commands::write_command_file(&workspace.root, &name, content).await?,
        None => {
            let template = req.template.as_deref().unwrap_or_default();
            commands::upsert_command(&workspace.root, &name, &req.options, template).await?
        }
    };
    let action = upsert_action(created);
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("commands.upsert", &name, format!("Command {name} {action}"))
                .reload(
                    ReloadReason::Config,
                    ReloadTrigger::new("command", &name, action).with_path(display(&path)),
                ),
        )
        .await;

    Ok(Json(WriteResponse {
        ok: true,
        name,
        path: display(&path),
        created,
        reload_event,
    }))
}

pub async fn commands_remove_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath((id, name)): ApiPath<(String, String)>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let name = commands::validate_command_name(&name)?;

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("commands.remove", format!("Delete command {name}")).path(
                workspace
                    .root
                    .join(commands::COMMANDS_DIR)
                    .join(format!("{name}.md")),
            ),
        )
        .await?;

    let removed: Vec<String> = commands::remove_command(&workspace.root, &name)
        .await?
        .iter()
        .map(|p| display(p))
        .collect();
    let mut trigger = ReloadTrigger::new("command", &name, "removed");
    if let Some(first) = removed.first() {
        trigger = trigger.with_path(first.clone());
    }
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("commands.remove", &name, format!("Command {name} removed"))
                .reload(ReloadReason::Config, trigger),
        )
        .await;

    Ok(Json(RemoveResponse {
        ok: true,
        name,
        removed,
        reload_event,
    }))
}

// --- MCP ---

pub async fn mcp_list_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ItemsResponse<McpEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let items = mcp::list_mcp(&state.store(&workspace)).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn mcp_add_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<McpAddRequest>,
) -> Result<Json<ChangeResponse<McpEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    let name = mcp::validate_mcp(&req.name, &req.config)?;

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("mcp.add", format!("Configure MCP server {name}"))
                .path(store.engine_config_path()),
        )
        .await?;

    let change = mcp::add_mcp(&store, &name, req.config).await?;
    let reload_event = if change.changed {
        state
            .record_change(
                &workspace,
                &actor,
                ChangeRecord::new("mcp.add", &name, format!("Configured MCP server {name}"))
                    .reload(
                        ReloadReason::Mcp,
                        ReloadTrigger::new("mcp", &name, "added")
                            .with_path(display(&store.engine_config_path())),
                    ),
            )
            .await
    } else {
        None
    };

    Ok(Json(ChangeResponse {
        ok: true,
        changed: change.changed,
        items: change.items,
        reload_event,
    }))
}

pub async fn mcp_remove_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath((id, name)): ApiPath<(String, String)>,
) -> Result<Json<ChangeResponse<McpEntry>>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    let name = mcp::require_mcp(&store, &name).await?;

    state
        .authorize_write(
            &workspace,
            &actor,
            WriteIntent::new("mcp.remove", format!("Remove MCP server {name}"))
                .path(store.engine_config_path()),
        )
        .await?;

    let change = mcp::remove_mcp(&store, &name).await?;
    let reload_event = state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("mcp.remove", &name, format!("Removed MCP server {name}")).reload(
                ReloadReason::Mcp,
                ReloadTrigger::new("mcp", &name, "removed")
                    .with_path(display(&store.engine_config_path())),
            ),
        )
        .await;

    Ok(Json(ChangeResponse {
        ok: true,
        changed: change.changed,
        items: change.items,
        reload_event,
    }))
}
