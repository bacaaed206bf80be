//! Configuration for the OpenWork server.
//!
//! Settings are resolved with priority: CLI flag / env var > JSON config
//! file > default. `./.env` and `~/.openwork/.env` are loaded into the
//! environment before the CLI is parsed (see [`crate::bootstrap`]).

pub mod file;
pub(crate) mod helpers;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::approval::{ApprovalConfig, ApprovalMode, DEFAULT_APPROVAL_TIMEOUT};
use crate::cli::Cli;
use crate::error::ConfigError;
use crate::providers::ImagePollConfig;
use crate::workspace::{EngineCredentials, Workspace, stable_workspace_id};

pub use self::file::{ConfigFile, WorkspaceConfig};
use self::helpers::{generate_token, non_empty, validate_base_url};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_ENGINE_USERNAME: &str = "opencode";

/// Which tokens were generated because none was configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratedTokens {
    pub client: bool,
    pub host: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub client_token: SecretString,
    pub host_token: SecretString,
    pub generated_tokens: GeneratedTokens,
    pub cors_origins: Vec<String>,
    pub read_only: bool,
    pub approval: ApprovalConfig,
    pub authorized_roots: Vec<PathBuf>,
    pub workspaces: Vec<Workspace>,
    pub data_dir: PathBuf,
    pub image_poll: ImagePollConfig,
}

impl ServerConfig {
    /// Resolve from parsed CLI arguments, reading `--config` if given.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Self::from_sources(cli, file)
    }

    pub fn from_sources(cli: &Cli, file: ConfigFile) -> Result<Self, ConfigError> {
        let (client_token, client_generated) =
            match non_empty(cli.token.as_deref()).or(non_empty(file.token.as_deref())) {
                Some(token) => (token, false),
                None => (generate_token(), true),
            };
        let (host_token, host_generated) = match non_empty(cli.host_token.as_deref())
            .or(non_empty(file.host_token.as_deref()))
        {
            Some(token) => (token, false),
            None => (generate_token(), true),
        };

        let approval = ApprovalConfig {
            mode: cli
                .approval
                .or(file.approval.mode)
                .unwrap_or(ApprovalMode::Manual),
            timeout: cli
                .approval_timeout_ms
                .or(file.approval.timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_APPROVAL_TIMEOUT),
        };

        let defaults = ImagePollConfig::default();
        let image_poll = ImagePollConfig {
            interval: cli
                .image_poll_interval_ms
                .or(file.image_poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_attempts: cli
                .image_poll_max_attempts
                .or(file.image_poll_max_attempts)
                .unwrap_or(defaults.max_attempts)
                .max(1),
        };

        let workspace_configs = if cli.workspaces.is_empty() {
            file.workspaces
        } else {
            cli.workspaces
                .iter()
                .map(|path| WorkspaceConfig {
                    path: path.clone(),
                    ..Default::default()
                })
                .collect()
        };
        let workspaces = build_workspaces(cli, workspace_configs)?;

        Ok(Self {
            host: non_empty(cli.host.as_deref())
                .or(non_empty(file.host.as_deref()))
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            client_token: SecretString::from(client_token),
            host_token: SecretString::from(host_token),
            generated_tokens: GeneratedTokens {
                client: client_generated,
                host: host_generated,
            },
            cors_origins: if cli.cors_origins.is_empty() {
                file.cors_origins
            } else {
                cli.cors_origins.clone()
            },
            read_only: cli.read_only || file.read_only.unwrap_or(false),
            approval,
            authorized_roots: if cli.authorized_roots.is_empty() {
                file.authorized_roots
            } else {
                cli.authorized_roots.clone()
            },
            workspaces,
            data_dir: cli
                .data_dir
                .clone()
                .or(file.data_dir)
                .unwrap_or_else(crate::bootstrap::default_data_dir),
            image_poll,
        })
    }
}

/// Turn configured entries into workspaces. CLI engine settings fill in
/// whatever an entry leaves unset.
fn build_workspaces(
    cli: &Cli,
    configs: Vec<WorkspaceConfig>,
) -> Result<Vec<Workspace>, ConfigError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(configs.len());

    for config in configs {
        let path = std::path::absolute(&config.path).unwrap_or_else(|_| config.path.clone());
        let mut workspace = Workspace::local(&path);
        workspace.kind = config.kind;
        if let Some(id) = non_empty(config.id.as_deref()) {
            workspace.id = id;
        } else {
            workspace.id = stable_workspace_id(&path);
        }
        if let Some(name) = non_empty(config.name.as_deref()) {
            workspace.display_name = name;
        }

        let base_url = non_empty(config.base_url.as_deref())
            .or(non_empty(cli.opencode_base_url.as_deref()));
        workspace.engine_base_url = base_url
            .map(|url| validate_base_url(&format!("workspaces[{}].baseUrl", workspace.id), &url))
            .transpose()?;
        workspace.engine_directory = non_empty(config.directory.as_deref())
            .or(non_empty(cli.opencode_directory.as_deref()));

        let password = non_empty(config.opencode_password.as_deref())
            .or(non_empty(cli.opencode_password.as_deref()));
        workspace.engine_credentials = password.map(|password| EngineCredentials {
            username: non_empty(config.opencode_username.as_deref())
                .or(non_empty(cli.opencode_username.as_deref()))
                .unwrap_or_else(|| DEFAULT_ENGINE_USERNAME.to_string()),
            password: SecretString::from(password),
        });

        if !seen.insert(workspace.id.clone()) {
            return Err(ConfigError::InvalidValue {
                key: "workspaces".to_string(),
                message: format!("duplicate workspace id '{}'", workspace.id),
            });
        }
        out.push(workspace);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::workspace::WorkspaceKind;

    #[test]
    fn defaults_apply_without_sources() {
        let config = ServerConfig::from_sources(&Cli::default(), ConfigFile::default()).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.approval.mode, ApprovalMode::Manual);
        assert_eq!(config.approval.timeout, Duration::from_millis(30_000));
        assert_eq!(config.image_poll.interval, Duration::from_millis(2000));
        assert_eq!(config.image_poll.max_attempts, 60);
        assert!(config.generated_tokens.client && config.generated_tokens.host);
        assert_ne!(
            config.client_token.expose_secret(),
            config.host_token.expose_secret()
        );
        assert!(!config.read_only);
    }

    #[test]
    fn cli_wins_over_file() {
        let cli = Cli {
            port: Some(9001),
            token: Some("cli-token".into()),
            approval: Some(ApprovalMode::Auto),
            ..Default::default()
        };
        let file = ConfigFile {
            port: Some(7000),
            host: Some("0.0.0.0".into()),
            token: Some("file-token".into()),
            host_token: Some("file-host".into()),
            approval: file::ApprovalFileConfig {
                mode: Some(ApprovalMode::Manual),
                timeout_ms: Some(1234),
            },
            ..Default::default()
        };
        let config = ServerConfig::from_sources(&cli, file).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.client_token.expose_secret(), "cli-token");
        assert_eq!(config.host_token.expose_secret(), "file-host");
        assert_eq!(config.generated_tokens, GeneratedTokens::default());
        assert_eq!(config.approval.mode, ApprovalMode::Auto);
        assert_eq!(config.approval.timeout, Duration::from_millis(1234));
    }

    #[test]
    fn cli_workspaces_pick_up_engine_settings() {
        let cli = Cli {
            workspaces: vec![PathBuf::from("/work/a")],
            opencode_base_url: Some("http://127.0.0.1:4096/".into()),
            opencode_password: Some("pw".into()),
            ..Default::default()
        };
        let config = ServerConfig::from_sources(&cli, ConfigFile::default()).unwrap();
        let ws = &config.workspaces[0];
        assert_eq!(ws.id, stable_workspace_id(&PathBuf::from("/work/a")));
        assert_eq!(ws.display_name, "a");
        assert_eq!(ws.engine_base_url.as_deref(), Some("http://127.0.0.1:4096"));
        let creds = ws.engine_credentials.as_ref().unwrap();
        assert_eq!(creds.username, DEFAULT_ENGINE_USERNAME);
        assert_eq!(creds.password.expose_secret(), "pw");
    }

    #[test]
    fn file_workspaces_keep_their_ids() {
        let file = ConfigFile {
            workspaces: vec![
                WorkspaceConfig {
                    id: Some("w1".into()),
                    name: Some("Main".into()),
                    path: PathBuf::from("/work/a"),
                    kind: WorkspaceKind::Remote,
                    ..Default::default()
                },
                WorkspaceConfig {
                    id: Some("w1".into()),
                    path: PathBuf::from("/work/b"),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let err = ServerConfig::from_sources(&Cli::default(), file.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let mut file = file;
        file.workspaces.pop();
        let config = ServerConfig::from_sources(&Cli::default(), file).unwrap();
        assert_eq!(config.workspaces[0].id, "w1");
        assert_eq!(config.workspaces[0].display_name, "Main");
        assert_eq!(config.workspaces[0].kind, WorkspaceKind::Remote);
    }

    #[test]
    fn invalid_engine_url_is_rejected() {
        let cli = Cli {
            workspaces: vec![PathBuf::from("/work/a")],
            opencode_base_url: Some("localhost:4096".into()),
            ..Default::default()
        };
        assert!(ServerConfig::from_sources(&cli, ConfigFile::default()).is_err());
    }
}
