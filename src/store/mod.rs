//! Per-workspace configuration files.
//!
//! Two independent documents live in every workspace:
//! - the engine config (`opencode.jsonc`, falling back to `opencode.json`),
//!   edited surgically so hand-written comments survive;
//! - the app config (`.opencode/openwork.json`), plain JSON that callers
//!   either shallow-merge into or replace wholesale.

pub mod atomic;
pub mod jsonc;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use atomic::{read_optional, write_atomic};

pub const ENGINE_CONFIG_JSONC: &str = "opencode.jsonc";
pub const ENGINE_CONFIG_JSON: &str = "opencode.json";
pub const APP_CONFIG_PATH: &str = ".opencode/openwork.json";

const NEW_ENGINE_CONFIG: &str = "{\n  \"$schema\": \"https://opencode.ai/config.json\"\n}\n";

/// How a write combines with what is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Merge,
    Replace,
}

/// Config file access for one workspace root.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine_config_path(&self) -> PathBuf {
        let jsonc = self.root.join(ENGINE_CONFIG_JSONC);
        if jsonc.is_file() {
            jsonc
        } else {
            self.root.join(ENGINE_CONFIG_JSON)
        }
    }

    pub fn app_config_path(&self) -> PathBuf {
        self.root.join(APP_CONFIG_PATH)
    }

    /// Parsed engine config. A missing file reads as an empty object.
    pub async fn read_engine_config(&self) -> Result<Map<String, Value>, StoreError> {
        let path = self.engine_config_path();
        let Some(text) = read_optional(&path).await? else {
            return Ok(Map::new());
        };
        match jsonc::parse(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Parse {
                path,
                message: "root value must be an object".to_string(),
            }),
            Err(e) => Err(StoreError::Parse {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Replace the named top-level keys, leaving the rest of the file as is.
    pub async fn patch_engine_config(&self, patch: &Map<String, Value>) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let path = self.engine_config_path();
        let current = read_optional(&path)
            .await?
            .unwrap_or_else(|| NEW_ENGINE_CONFIG.to_string());
        let updated = jsonc::patch_top_level(&current, patch).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, updated.as_bytes()).await?;
        tracing::debug!(path = %path.display(), keys = patch.len(), "Patched engine config");
        Ok(())
    }

    /// Overwrite the engine config with `config`. Comments are not kept.
    pub async fn replace_engine_config(&self, config: &Map<String, Value>) -> Result<(), StoreError> {
        let path = self.engine_config_path();
        write_atomic(&path, render_json(config)?.as_bytes()).await
    }

    /// Parsed app config. A missing file reads as an empty object.
    pub async fn read_app_config(&self) -> Result<Map<String, Value>, StoreError> {
        let path = self.app_config_path();
        let Some(text) = read_optional(&path).await? else {
            return Ok(Map::new());
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Parse {
                path,
                message: "root value must be an object".to_string(),
            }),
            Err(e) => Err(StoreError::Parse {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Write the app config and return what ended up on disk.
    pub async fn write_app_config(
        &self,
        value: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<Map<String, Value>, StoreError> {
        let next = match mode {
            WriteMode::Replace => value,
            WriteMode::Merge => {
                let mut current = self.read_app_config().await?;
                current.extend(value);
                current
            }
        };
        write_atomic(&self.app_config_path(), render_json(&next)?.as_bytes()).await?;
        Ok(next)
    }
}

fn render_json(map: &Map<String, Value>) -> Result<String, StoreError> {
    let mut text =
        serde_json::to_string_pretty(map).map_err(|e| StoreError::Invalid(e.to_string()))?;
    text.push('\n');
    Ok(text)
}
