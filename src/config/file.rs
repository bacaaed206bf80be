//! Optional JSON config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::approval::ApprovalMode;
use crate::error::ConfigError;
use crate::workspace::WorkspaceKind;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalFileConfig {
    pub mode: Option<ApprovalMode>,
    pub timeout_ms: Option<u64>,
}

/// One workspace as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
    pub path: PathBuf,
    #[serde(default, alias = "workspaceType")]
    pub kind: WorkspaceKind,
    #[serde(default, alias = "opencodeBaseUrl")]
    pub base_url: Option<String>,
    #[serde(default, alias = "opencodeDirectory")]
    pub directory: Option<String>,
    #[serde(default)]
    pub opencode_username: Option<String>,
    #[serde(default)]
    pub opencode_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub host_token: Option<String>,
    pub cors_origins: Vec<String>,
    pub read_only: Option<bool>,
    pub approval: ApprovalFileConfig,
    pub authorized_roots: Vec<PathBuf>,
    pub workspaces: Vec<WorkspaceConfig>,
    pub data_dir: Option<PathBuf>,
    pub image_poll_interval_ms: Option<u64>,
    pub image_poll_max_attempts: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_file() {
        let file: ConfigFile = serde_json::from_str(
            r#"{
                "port": 9999,
                "hostToken": "h",
                "corsOrigins": ["*"],
                "approval": {"mode": "auto", "timeoutMs": 500},
                "workspaces": [
                    {"id": "w1", "path": "/work/a", "workspaceType": "remote",
                     "baseUrl": "http://127.0.0.1:4096", "directory": "/work/a"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(file.port, Some(9999));
        assert_eq!(file.approval.mode, Some(ApprovalMode::Auto));
        assert_eq!(file.approval.timeout_ms, Some(500));
        assert_eq!(file.workspaces[0].kind, WorkspaceKind::Remote);
        assert_eq!(
            file.workspaces[0].base_url.as_deref(),
            Some("http://127.0.0.1:4096")
        );
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = ConfigFile::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
