//! MCP connectors, stored under the `mcp` object of the engine config.

use serde::Serialize;
use serde_json::{Map, Value};

use super::validate_simple_name;
use crate::error::StoreError;
use crate::store::ConfigStore;

pub const MCP_KEY: &str = "mcp";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpEntry {
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpChange {
    pub changed: bool,
    pub items: Vec<McpEntry>,
}

fn mcp_map(config: &Map<String, Value>) -> Map<String, Value> {
    config
        .get(MCP_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn entries(map: &Map<String, Value>) -> Vec<McpEntry> {
    map.iter()
        .map(|(name, config)| McpEntry {
            name: name.clone(),
            config: config.clone(),
        })
        .collect()
}

async fn write_map(store: &ConfigStore, map: Map<String, Value>) -> Result<(), StoreError> {
    let mut patch = Map::new();
    patch.insert(MCP_KEY.to_string(), Value::Object(map));
    store.patch_engine_config(&patch).await
}

pub async fn list_mcp(store: &ConfigStore) -> Result<Vec<McpEntry>, StoreError> {
    Ok(entries(&mcp_map(&store.read_engine_config().await?)))
}

/// Check a connector definition without touching the config file.
pub fn validate_mcp(name: &str, config: &Value) -> Result<String, StoreError> {
    let name = validate_simple_name("mcp", name)?;
    if !config.is_object() {
        return Err(StoreError::Invalid("mcp config must be an object".to_string()));
    }
    Ok(name)
}

/// The validated name of an existing connector, or `NotFound`.
pub async fn require_mcp(store: &ConfigStore, name: &str) -> Result<String, StoreError> {
    let name = validate_simple_name("mcp", name)?;
    if mcp_map(&store.read_engine_config().await?).contains_key(&name) {
        Ok(name)
    } else {
        Err(StoreError::NotFound(format!("MCP server not found: {name}")))
    }
}

/// Add or replace a connector. An identical definition is a no-op.
pub async fn add_mcp(store: &ConfigStore, name: &str, config: Value) -> Result<McpChange, StoreError> {
    let name = validate_mcp(name, &config)?;
    let mut map = mcp_map(&store.read_engine_config().await?);
    if map.get(&name) == Some(&config) {
        return Ok(McpChange {
            changed: false,
            items: entries(&map),
        });
    }
    map.insert(name, config);
    write_map(store, map.clone()).await?;
    Ok(McpChange {
        changed: true,
        items: entries(&map),
    })
}

pub async fn remove_mcp(store: &ConfigStore, name: &str) -> Result<McpChange, StoreError> {
    let name = validate_simple_name("mcp", name)?;
    let mut map = mcp_map(&store.read_engine_config().await?);
    if map.remove(&name).is_none() {
        return Err(StoreError::NotFound(format!("MCP server not found: {name}")));
    }
    write_map(store, map.clone()).await?;
    Ok(McpChange {
        changed: true,
        items: entries(&map),
    })
}
