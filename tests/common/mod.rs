//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use openwork_server::approval::{ApprovalConfig, ApprovalMode};
use openwork_server::config::{GeneratedTokens, ServerConfig};
use openwork_server::providers::{ImagePollConfig, ProviderProxy, ProviderRegistry, Sleeper};
use openwork_server::server::{AppState, build_router};
use openwork_server::workspace::{EngineCredentials, Workspace};

pub const CLIENT_TOKEN: &str = "client-token-123";
pub const HOST_TOKEN: &str = "host-token-456";
pub const WORKSPACE_ID: &str = "w1";

/// Records every requested pause instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub root: PathBuf,
    pub state: Arc<AppState>,
    pub router: Router,
    pub sleeper: Arc<RecordingSleeper>,
}

pub struct EnvOptions {
    pub approval: ApprovalConfig,
    pub read_only: bool,
    pub cors_origins: Vec<String>,
    pub engine_base_url: Option<String>,
    pub engine_directory: Option<String>,
    pub engine_password: Option<&'static str>,
    pub poll: ImagePollConfig,
    /// Relative to the temp dir; empty means the workspace is its own root.
    pub authorized_roots: Vec<&'static str>,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            approval: ApprovalConfig {
                mode: ApprovalMode::Auto,
                timeout: Duration::from_millis(200),
            },
            read_only: false,
            cors_origins: Vec::new(),
            engine_base_url: None,
            engine_directory: None,
            engine_password: None,
            poll: ImagePollConfig {
                interval: Duration::from_millis(1500),
                max_attempts: 3,
            },
            authorized_roots: Vec::new(),
        }
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_options(EnvOptions::default())
    }

    pub fn with_options(options: EnvOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();

        let mut workspace = Workspace::local(&root);
        workspace.id = WORKSPACE_ID.to_string();
        workspace.engine_base_url = options.engine_base_url;
        workspace.engine_directory = options.engine_directory;
        workspace.engine_credentials = options.engine_password.map(|password| EngineCredentials {
            username: "opencode".to_string(),
            password: SecretString::from(password),
        });

        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            client_token: SecretString::from(CLIENT_TOKEN),
            host_token: SecretString::from(HOST_TOKEN),
            generated_tokens: GeneratedTokens::default(),
            cors_origins: options.cors_origins,
            read_only: options.read_only,
            approval: options.approval,
            authorized_roots: options
                .authorized_roots
                .iter()
                .map(|r| dir.path().join(r))
                .collect(),
            workspaces: vec![workspace],
            data_dir: data_dir.clone(),
            image_poll: options.poll,
        };

        let sleeper = Arc::new(RecordingSleeper::default());
        let providers = ProviderProxy::with_sleeper(
            ProviderRegistry::new(&data_dir),
            options.poll,
            sleeper.clone(),
        )
        .unwrap();
        let state = Arc::new(AppState::with_providers(&config, providers).unwrap());
        let router = build_router(state.clone());

        Self {
            dir,
            root: std::fs::canonicalize(&root).unwrap(),
            state,
            router,
            sleeper,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Register a provider entry plus its key.
    pub fn add_provider(&self, id: &str, base_url: &str, api_key: &str) {
        let providers = serde_json::json!({
            "providers": [{ "id": id, "baseUrl": base_url, "models": ["m1"],
                "defaultModels": { "chat": "chat-default", "image": "image-default" } }]
        });
        let secrets = serde_json::json!({ "secrets": { id: api_key } });
        std::fs::write(self.data_dir().join("providers.json"), providers.to_string()).unwrap();
        std::fs::write(
            self.data_dir().join("provider-secrets.json"),
            secrets.to_string(),
        )
        .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (u16, Value) {
        let response = self.send(client_request(method, uri, body)).await;
        let status = response.status().as_u16();
        (status, body_json(response).await)
    }

    pub fn file(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

pub fn client_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {CLIENT_TOKEN}"));
    with_body(builder, body)
}

pub fn host_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-openwork-host-token", HOST_TOKEN);
    with_body(builder, body)
}

fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

pub fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("failed to bind")
}

/// Serve `app` on an ephemeral local port. `None` when the sandbox forbids
/// binding.
pub async fn start_upstream(app: Router) -> Option<SocketAddr> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind upstream: {e}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some(addr)
}
