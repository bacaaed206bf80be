use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use openwork_server::bootstrap::load_openwork_env;
use openwork_server::cli::{Cli, LogFormat};
use openwork_server::config::ServerConfig;
use openwork_server::server::{AppState, start_server};
use openwork_server::watch::watch_workspaces;

const DEFAULT_LOG_FILTER: &str = "openwork_server=info,tower_http=info";

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_openwork_env();
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = ServerConfig::resolve(&cli).context("invalid configuration")?;
    if config.workspaces.is_empty() {
        tracing::warn!("No workspaces configured; pass --workspace or a config file");
    }
    // Generated tokens are only ever shown here.
    if config.generated_tokens.client {
        tracing::info!(
            token = config.client_token.expose_secret(),
            "Generated client token"
        );
    }
    if config.generated_tokens.host {
        tracing::info!(
            token = config.host_token.expose_secret(),
            "Generated host token"
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let state = Arc::new(AppState::from_config(&config)?);

    tracing::info!(
        workspaces = config.workspaces.len(),
        approval = ?config.approval.mode,
        read_only = config.read_only,
        "Starting OpenWork server"
    );
    let watchers = watch_workspaces(&state.workspaces, state.reload_events.clone());
    tracing::info!(count = watchers.len(), "Watching workspaces for changes");
    let handle = start_server(addr, state).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    handle.shutdown().await;
    drop(watchers);
    Ok(())
}
