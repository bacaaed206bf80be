//! Workspace export and import.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::extensions::{commands, skills};
use crate::reload::{ReloadReason, ReloadTrigger};
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::state::{ChangeRecord, WriteIntent};
use crate::server::types::*;
use crate::store::WriteMode;

pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<WorkspaceExport>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    Ok(Json(WorkspaceExport {
        version: EXPORT_VERSION,
        workspace_id: workspace.id().to_string(),
        exported_at: chrono::Utc::now(),
        opencode: store.read_engine_config().await?,
        openwork: store.read_app_config().await?,
        skills: skills::read_skill_bundles(&workspace.root).await?,
        commands: commands::read_command_bundles(&workspace.root).await?,
    }))
}

/// Apply an export bundle. Each section is optional and carries its own
/// merge/replace mode; `replace` for skills and commands deletes whatever
/// the bundle does not name.
pub async fn import_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let workspace = state.workspaces.resolve(&id)?;
    let store = state.store(&workspace);
    let root = workspace.root.clone();

    if req.opencode.is_none()
        && req.openwork.is_none()
        && req.skills.is_none()
        && req.commands.is_none()
    {
        return Err(ApiError::InvalidPayload("import bundle is empty".to_string()));
    }
    for bundle in req.skills.iter().flatten() {
        skills::validate_skill_name(&bundle.name)?;
    }
    for bundle in req.commands.iter().flatten() {
        commands::validate_command_name(&bundle.name)?;
    }

    let mut sections = Vec::new();
    let mut intent = WriteIntent::new("workspace.import", "");
    if req.opencode.is_some() {
        sections.push("opencode");
        intent = intent.path(store.engine_config_path());
    }
    if req.openwork.is_some() {
        sections.push("openwork");
        intent = intent.path(store.app_config_path());
    }
    if req.skills.is_some() {
        sections.push("skills");
        intent = intent.path(root.join(skills::SKILLS_DIR));
    }
    if req.commands.is_some() {
        sections.push("commands");
        intent = intent.path(root.join(commands::COMMANDS_DIR));
    }
    intent.summary = format!("Import workspace bundle: {}", sections.join(", "));
    let summary = intent.summary.clone();

    state.authorize_write(&workspace, &actor, intent).await?;

    let mut imported = ImportSummary::default();
    let mut reloads = Vec::new();

    if let Some(config) = &req.opencode {
        match req.mode.opencode {
            WriteMode::Merge => store.patch_engine_config(config).await?,
            WriteMode::Replace => store.replace_engine_config(config).await?,
        }
        imported.opencode = true;
        reloads.push((
            ReloadReason::Config,
            ReloadTrigger::new("config", "opencode", "imported")
                .with_path(store.engine_config_path().display().to_string()),
        ));
    }

    if let Some(app) = req.openwork {
        store.write_app_config(app, req.mode.openwork).await?;
        imported.openwork = true;
    }

    if let Some(bundles) = &req.skills {
        for bundle in bundles {
            skills::upsert_skill(&root, &bundle.name, &bundle.content, None).await?;
            imported.skills.push(bundle.name.clone());
        }
        if req.mode.skills == WriteMode::Replace {
            let keep: HashSet<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
            for existing in skills::list_skills(&root).await? {
                if keep.contains(existing.name.as_str()) {
                    continue;
                }
                match skills::remove_skill(&root, &existing.name).await {
                    Ok(_) => imported.removed_skills.push(existing.name),
                    Err(e) => {
                        tracing::warn!(skill = %existing.name, "Skipping skill removal: {}", e)
                    }
                }
            }
        }
        reloads.push((
            ReloadReason::Skills,
            ReloadTrigger::new("skill", "import", "imported")
                .with_path(root.join(skills::SKILLS_DIR).display().to_string()),
        ));
    }

    if let Some(bundles) = &req.commands {
        for bundle in bundles {
            commands::write_command_file(&root, &bundle.name, &bundle.content).await?;
            imported.commands.push(bundle.name.clone());
        }
        if req.mode.commands == WriteMode::Replace {
            let keep: HashSet<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
            for existing in commands::list_commands(&root).await? {
                if keep.contains(existing.name.as_str()) {
                    continue;
                }
                match commands::remove_command(&root, &existing.name).await {
                    Ok(_) => imported.removed_commands.push(existing.name),
                    Err(e) => {
                        tracing::warn!(command = %existing.name, "Skipping command removal: {}", e)
                    }
                }
            }
        }
        reloads.push((
            ReloadReason::Config,
            ReloadTrigger::new("command", "import", "imported")
                .with_path(root.join(commands::COMMANDS_DIR).display().to_string()),
        ));
    }

    state
        .record_change(
            &workspace,
            &actor,
            ChangeRecord::new("workspace.import", sections.join(","), summary),
        )
        .await;
    let reload_events = reloads
        .into_iter()
        .map(|(reason, trigger)| state.reload_events.record(workspace.id(), reason, trigger))
        .collect();

    tracing::info!(workspace = %workspace.id(), sections = ?sections, "Imported workspace bundle");
    Ok(Json(ImportResponse {
        ok: true,
        imported,
        reload_events,
    }))
}
