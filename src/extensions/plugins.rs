//! Engine plugins, stored under the `plugin` key of the engine config.
//!
//! A plugin is identified by its package name with any version suffix
//! removed, compared case-insensitively. Adding a spec whose name is already
//! present replaces that entry in place; adding an identical spec is a no-op.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::store::ConfigStore;

pub const PLUGIN_KEY: &str = "plugin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginEntry {
    pub spec: String,
    pub name: String,
}

impl PluginEntry {
    fn new(spec: String) -> Self {
        let name = plugin_name(&spec);
        Self { spec, name }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginChange {
    pub changed: bool,
    pub items: Vec<PluginEntry>,
}

/// `pkg@1.2` -> `pkg`, `@scope/pkg@1.2` -> `@scope/pkg`, lowercased.
pub fn plugin_name(spec: &str) -> String {
    let spec = spec.trim();
    let cut = if let Some(rest) = spec.strip_prefix('@') {
        rest.find('@').map(|i| i + 1)
    } else {
        spec.find('@')
    };
    let name = match cut {
        Some(i) if i > 0 => &spec[..i],
        _ => spec,
    };
    name.to_ascii_lowercase()
}

fn plugin_specs(config: &Map<String, Value>) -> Vec<String> {
    match config.get(PLUGIN_KEY) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

async fn write_specs(store: &ConfigStore, specs: &[String]) -> Result<(), StoreError> {
    let mut patch = Map::new();
    patch.insert(
        PLUGIN_KEY.to_string(),
        Value::Array(specs.iter().cloned().map(Value::String).collect()),
    );
    store.patch_engine_config(&patch).await
}

fn entries(specs: Vec<String>) -> Vec<PluginEntry> {
    specs.into_iter().map(PluginEntry::new).collect()
}

pub async fn list_plugins(store: &ConfigStore) -> Result<Vec<PluginEntry>, StoreError> {
    Ok(entries(plugin_specs(&store.read_engine_config().await?)))
}

pub async fn add_plugin(store: &ConfigStore, spec: &str) -> Result<PluginChange, StoreError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(StoreError::Invalid("plugin spec is required".to_string()));
    }
    let mut specs = plugin_specs(&store.read_engine_config().await?);

    if specs.iter().any(|s| s == spec) {
        return Ok(PluginChange {
            changed: false,
            items: entries(specs),
        });
    }

    let name = plugin_name(spec);
    match specs.iter().position(|s| plugin_name(s) == name) {
        Some(index) => specs[index] = spec.to_string(),
        None => specs.push(spec.to_string()),
    }
    write_specs(store, &specs).await?;
    Ok(PluginChange {
        changed: true,
        items: entries(specs),
    })
}

/// Fails with `NotFound` unless a plugin with this name is configured.
pub async fn require_plugin(store: &ConfigStore, name: &str) -> Result<(), StoreError> {
    let target = plugin_name(name);
    let specs = plugin_specs(&store.read_engine_config().await?);
    if specs.iter().any(|s| plugin_name(s) == target) {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("Plugin not found: {name}")))
    }
}

pub async fn remove_plugin(store: &ConfigStore, name: &str) -> Result<PluginChange, StoreError> {
    let target = plugin_name(name);
    let mut specs = plugin_specs(&store.read_engine_config().await?);
    let before = specs.len();
    specs.retain(|s| plugin_name(s) != target);
    if specs.len() == before {
        return Err(StoreError::NotFound(format!("Plugin not found: {name}")));
    }
    write_specs(store, &specs).await?;
    Ok(PluginChange {
        changed: true,
        items: entries(specs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_drop_versions_and_case() {
        assert_eq!(plugin_name("pkg@1.0"), "pkg");
        assert_eq!(plugin_name("Pkg"), "pkg");
        assert_eq!(plugin_name("@scope/pkg@2.0.0"), "@scope/pkg");
        assert_eq!(plugin_name("@Scope/Pkg"), "@scope/pkg");
        assert_eq!(plugin_name(" opencode-wakatime@latest "), "opencode-wakatime");
    }

    #[tokio::test]
    async fn add_is_idempotent_and_replaces_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let change = add_plugin(&store, "pkg@1.0").await.unwrap();
        assert!(change.changed);

        let change = add_plugin(&store, "pkg@1.0").await.unwrap();
        assert!(!change.changed);
        assert_eq!(change.items.len(), 1);

        add_plugin(&store, "other").await.unwrap();
        let change = add_plugin(&store, "PKG@2.0").await.unwrap();
        assert!(change.changed);
        let specs: Vec<_> = change.items.iter().map(|p| p.spec.as_str()).collect();
        assert_eq!(specs, vec!["PKG@2.0", "other"]);
    }

    #[tokio::test]
    async fn reads_single_string_form_and_removes_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("opencode.json"),
            "{\n  // one plugin\n  \"plugin\": \"pkg@1.0\"\n}\n",
        )
        .unwrap();
        let store = ConfigStore::new(dir.path());
        assert_eq!(list_plugins(&store).await.unwrap()[0].name, "pkg");

        let change = remove_plugin(&store, "pkg").await.unwrap();
        assert!(change.items.is_empty());
        let text = std::fs::read_to_string(dir.path().join("opencode.json")).unwrap();
        assert!(text.contains("// one plugin"));
        assert!(text.contains("\"plugin\": []"));

        assert!(matches!(
            remove_plugin(&store, "pkg").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn require_matches_by_normalized_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(matches!(
            require_plugin(&store, "pkg").await,
            Err(StoreError::NotFound(_))
        ));
        add_plugin(&store, "Pkg@1.0").await.unwrap();
        assert!(require_plugin(&store, "pkg").await.is_ok());
        assert!(require_plugin(&store, "pkg@2.0").await.is_ok());
    }
}
