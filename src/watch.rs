//! Filesystem watch on local workspaces.
//!
//! Edits made outside the API (an editor, `git checkout`) also leave the
//! engine's view stale. Each local workspace gets a watcher on its root
//! (non-recursive, for `opencode.json[c]`) and on `.opencode/` (recursive).
//! Matching changes become reload events, at most one per workspace per
//! [`WATCH_DEBOUNCE`], counting events recorded by the API itself.

use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::reload::{ReloadEventStore, ReloadReason, ReloadTrigger};
use crate::workspace::{WorkspaceKind, WorkspaceRegistry};

pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(750);

const OPENCODE_DIR: &str = ".opencode";

/// Keeps the underlying watcher alive; dropping it stops watching.
pub struct WorkspaceWatcher {
    workspace_id: String,
    _watcher: RecommendedWatcher,
}

impl WorkspaceWatcher {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }
}

/// Which reload a change at `path` calls for, if any.
pub fn reason_for_path(root: &Path, path: &Path) -> Option<ReloadReason> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect();

    // Temp files from atomic writes; the rename that follows is reported.
    if parts.last().is_some_and(|name| name.ends_with(".tmp")) {
        return None;
    }

    match parts.as_slice() {
        [file] if file == "opencode.json" || file == "opencode.jsonc" => Some(ReloadReason::Config),
        [dir, rest @ ..] if dir == OPENCODE_DIR => match rest.first().map(String::as_str) {
            // Audit trail and the app config are ours, not the engine's.
            Some("openwork") | Some("openwork.json") => None,
            Some("skills") | Some("skill") => Some(ReloadReason::Skills),
            _ => Some(ReloadReason::Config),
        },
        _ => None,
    }
}

fn action_for(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) => Some("created"),
        EventKind::Modify(_) => Some("modified"),
        EventKind::Remove(_) => Some("removed"),
        _ => None,
    }
}

fn classify(root: &Path, event: &Event) -> Option<(ReloadReason, ReloadTrigger)> {
    let action = action_for(&event.kind)?;
    event.paths.iter().find_map(|path| {
        let reason = reason_for_path(root, path)?;
        let name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        Some((
            reason,
            ReloadTrigger::new("file", name, action).with_path(path.display().to_string()),
        ))
    })
}

/// Start watching one workspace root.
pub fn watch_workspace(
    workspace_id: &str,
    root: &Path,
    events: Arc<ReloadEventStore>,
) -> Result<WorkspaceWatcher, notify::Error> {
    let id = workspace_id.to_string();
    let watched_root = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(workspace = %id, "Workspace watch error: {}", e);
                return;
            }
        };
        let Some((reason, trigger)) = classify(&watched_root, &event) else {
            return;
        };
        if events.recorded_within(&id, WATCH_DEBOUNCE) {
            return;
        }
        tracing::info!(
            workspace = %id,
            file = %trigger.name,
            reason = ?reason,
            "Workspace changed on disk"
        );
        events.record(&id, reason, trigger);
    })?;

    watcher.watch(root, RecursiveMode::NonRecursive)?;
    let opencode_dir = root.join(OPENCODE_DIR);
    if opencode_dir.is_dir() {
        watcher.watch(&opencode_dir, RecursiveMode::Recursive)?;
    }

    Ok(WorkspaceWatcher {
        workspace_id: workspace_id.to_string(),
        _watcher: watcher,
    })
}

/// Watch every local workspace in the registry. Workspaces that cannot be
/// watched are logged and skipped.
pub fn watch_workspaces(
    registry: &WorkspaceRegistry,
    events: Arc<ReloadEventStore>,
) -> Vec<WorkspaceWatcher> {
    let mut watchers = Vec::new();
    for workspace in registry.list() {
        if workspace.kind != WorkspaceKind::Local {
            continue;
        }
        let resolved = match registry.resolve(&workspace.id) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(workspace = %workspace.id, "Not watching workspace: {}", e);
                continue;
            }
        };
        match watch_workspace(resolved.id(), &resolved.root, events.clone()) {
            Ok(watcher) => watchers.push(watcher),
            Err(e) => {
                tracing::warn!(workspace = %workspace.id, "Failed to watch workspace: {}", e);
            }
        }
    }
    watchers
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn reason(path: &str) -> Option<ReloadReason> {
        let root = PathBuf::from("/work/app");
        reason_for_path(&root, &root.join(path))
    }

    #[test]
    fn maps_workspace_paths_to_reload_reasons() {
        assert_eq!(reason("opencode.json"), Some(ReloadReason::Config));
        assert_eq!(reason("opencode.jsonc"), Some(ReloadReason::Config));
        assert_eq!(reason(".opencode"), Some(ReloadReason::Config));
        assert_eq!(reason(".opencode/commands/ship.md"), Some(ReloadReason::Config));
        assert_eq!(reason(".opencode/skills/deploy/SKILL.md"), Some(ReloadReason::Skills));
        assert_eq!(reason(".opencode/skill/legacy/SKILL.md"), Some(ReloadReason::Skills));
    }

    #[test]
    fn ignores_unrelated_and_own_files() {
        assert_eq!(reason("src/main.rs"), None);
        assert_eq!(reason("nested/opencode.json"), None);
        assert_eq!(reason(".opencode/openwork/audit.jsonl"), None);
        assert_eq!(reason(".opencode/openwork.json"), None);
        assert_eq!(reason(".opencode/skills/deploy/.SKILL.md.abc123.tmp"), None);
        assert_eq!(
            reason_for_path(Path::new("/work/app"), Path::new("/work/app-other/opencode.json")),
            None
        );
    }

    #[test]
    fn classify_builds_a_file_trigger() {
        let root = PathBuf::from("/work/app");
        let event = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(root.join(".opencode/skills/deploy/SKILL.md"));
        let (reason, trigger) = classify(&root, &event).unwrap();
        assert_eq!(reason, ReloadReason::Skills);
        assert_eq!(trigger.kind, "file");
        assert_eq!(trigger.name, ".opencode/skills/deploy/SKILL.md");
        assert_eq!(trigger.action, "created");

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(root.join("opencode.json"));
        assert!(classify(&root, &access).is_none());
    }
}
