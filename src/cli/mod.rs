//! Command-line interface.
//!
//! Every flag can also be set through an `OPENWORK_*` environment variable.
//! Values given here win over the optional JSON config file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::approval::ApprovalMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "openwork-server",
    version,
    about = "Filesystem-backed control plane for OpenWork workspaces"
)]
pub struct Cli {
    /// JSON config file with server settings and workspaces.
    #[arg(long, env = "OPENWORK_SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "OPENWORK_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "OPENWORK_PORT")]
    pub port: Option<u16>,

    /// Client bearer token. Generated at startup when unset.
    #[arg(long, env = "OPENWORK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Host-only token. Generated at startup when unset.
    #[arg(long = "host-token", env = "OPENWORK_HOST_TOKEN", hide_env_values = true)]
    pub host_token: Option<String>,

    /// Workspace directory. Repeatable; the first one starts active.
    #[arg(long = "workspace", env = "OPENWORK_WORKSPACES", value_delimiter = ',')]
    pub workspaces: Vec<PathBuf>,

    /// Root under which workspace paths must live. Repeatable.
    #[arg(
        long = "authorized-root",
        env = "OPENWORK_AUTHORIZED_ROOTS",
        value_delimiter = ','
    )]
    pub authorized_roots: Vec<PathBuf>,

    /// Allowed CORS origin. Repeatable; `*` allows any origin.
    #[arg(long = "cors", env = "OPENWORK_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "OPENWORK_OPENCODE_BASE_URL")]
    pub opencode_base_url: Option<String>,

    #[arg(long, env = "OPENWORK_OPENCODE_DIRECTORY")]
    pub opencode_directory: Option<String>,

    #[arg(long, env = "OPENWORK_OPENCODE_USERNAME")]
    pub opencode_username: Option<String>,

    #[arg(long, env = "OPENWORK_OPENCODE_PASSWORD", hide_env_values = true)]
    pub opencode_password: Option<String>,

    #[arg(long, env = "OPENWORK_APPROVAL", value_enum)]
    pub approval: Option<ApprovalMode>,

    #[arg(long, env = "OPENWORK_APPROVAL_TIMEOUT_MS")]
    pub approval_timeout_ms: Option<u64>,

    /// Reject every mutating request with `read_only`.
    #[arg(
        long,
        env = "OPENWORK_READONLY",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub read_only: bool,

    /// Where the provider registry and secrets live.
    #[arg(long, env = "OPENWORK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "OPENWORK_IMAGE_POLL_INTERVAL_MS")]
    pub image_poll_interval_ms: Option<u64>,

    #[arg(long, env = "OPENWORK_IMAGE_POLL_MAX_ATTEMPTS")]
    pub image_poll_max_attempts: Option<u32>,

    #[arg(long, env = "OPENWORK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
