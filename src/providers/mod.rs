//! Provider registry and credential resolution.
//!
//! Providers are OpenAI-compatible endpoints registered in
//! `<dataDir>/providers.json`; their API keys live separately in
//! `<dataDir>/provider-secrets.json`. Both files are re-read on every lookup
//! so edits made by the desktop app are picked up without a restart.

pub mod chat;
pub mod images;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, StoreError};
use crate::store::read_optional;

pub use images::{
    GeneratedImage, ImageGenerationResult, ImagePollConfig, Sleeper, TokioSleeper,
};

pub const PROVIDERS_FILE: &str = "providers.json";
pub const PROVIDER_SECRETS_FILE: &str = "provider-secrets.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultModels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base_url: String,
    #[serde(default, alias = "models")]
    pub model_catalog: Vec<String>,
    #[serde(default)]
    pub default_models: DefaultModels,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersFile {
    #[serde(default)]
    providers: Vec<ProviderEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    secrets: HashMap<String, String>,
}

/// Registry entry as listed to clients. Never carries the key itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    #[serde(flatten)]
    pub entry: ProviderEntry,
    pub has_key: bool,
}

pub struct ProviderRegistry {
    providers_path: PathBuf,
    secrets_path: PathBuf,
}

impl ProviderRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            providers_path: data_dir.join(PROVIDERS_FILE),
            secrets_path: data_dir.join(PROVIDER_SECRETS_FILE),
        }
    }

    pub async fn list(&self) -> Result<Vec<ProviderSummary>, StoreError> {
        let providers = self.load_providers().await?;
        let secrets = self.load_secrets().await?;
        Ok(providers
            .into_iter()
            .map(|entry| {
                let has_key = secrets
                    .get(&entry.id)
                    .is_some_and(|k| !k.trim().is_empty());
                ProviderSummary { entry, has_key }
            })
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ProviderEntry>, StoreError> {
        Ok(self
            .load_providers()
            .await?
            .into_iter()
            .find(|p| p.id == id))
    }

    pub async fn secret(&self, id: &str) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .load_secrets()
            .await?
            .remove(id)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from))
    }

    async fn load_providers(&self) -> Result<Vec<ProviderEntry>, StoreError> {
        let Some(text) = read_optional(&self.providers_path).await? else {
            return Ok(Vec::new());
        };
        let file: ProvidersFile = serde_json::from_str(&text).map_err(|e| StoreError::Parse {
            path: self.providers_path.clone(),
            message: e.to_string(),
        })?;
        Ok(file.providers)
    }

    async fn load_secrets(&self) -> Result<HashMap<String, String>, StoreError> {
        let Some(text) = read_optional(&self.secrets_path).await? else {
            return Ok(HashMap::new());
        };
        let file: SecretsFile = serde_json::from_str(&text).map_err(|e| StoreError::Parse {
            path: self.secrets_path.clone(),
            message: e.to_string(),
        })?;
        Ok(file.secrets)
    }
}

/// Credential fields accepted on every proxy request body.
#[derive(Debug, Clone, Default)]
pub struct ProviderAuthRequest {
    pub provider_id: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub allow_fallback: bool,
}

impl ProviderAuthRequest {
    /// Pull the credential fields out of a request body, leaving the payload
    /// that goes upstream.
    pub fn take_from(body: &mut Map<String, Value>) -> Self {
        let mut take_str = |key: &str| {
            body.remove(key)
                .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
                .filter(|s| !s.is_empty())
        };
        let provider_id = take_str("providerId");
        let base_url = take_str("baseUrl");
        let api_key = take_str("apiKey");
        let allow_fallback = body
            .remove("allowFallback")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Self {
            provider_id,
            base_url,
            api_key,
            allow_fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub provider_id: Option<String>,
    pub base_url: String,
    pub api_key: SecretString,
    pub default_models: DefaultModels,
}

impl ResolvedProvider {
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Work out which endpoint and key a proxy request should use.
pub async fn resolve_provider_auth(
    registry: &ProviderRegistry,
    request: ProviderAuthRequest,
) -> Result<ResolvedProvider, ApiError> {
    let overrides = match (&request.base_url, &request.api_key) {
        (Some(base_url), Some(api_key)) => Some(ResolvedProvider {
            provider_id: request.provider_id.clone(),
            base_url: base_url.clone(),
            api_key: SecretString::from(api_key.clone()),
            default_models: DefaultModels::default(),
        }),
        _ => None,
    };

    let Some(provider_id) = request.provider_id.clone() else {
        return overrides.ok_or_else(|| {
            ApiError::InvalidProvider("providerId or both baseUrl and apiKey are required".into())
        });
    };

    let fallback = if request.allow_fallback { overrides } else { None };

    let Some(entry) = registry.get(&provider_id).await? else {
        return fallback.ok_or(ApiError::ProviderNotFound(provider_id));
    };
    let Some(api_key) = registry.secret(&provider_id).await? else {
        return fallback.ok_or(ApiError::ProviderMissingKey(provider_id));
    };

    Ok(ResolvedProvider {
        provider_id: Some(entry.id),
        base_url: entry.base_url,
        api_key,
        default_models: entry.default_models,
    })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Best-effort human message from an upstream error body.
pub(crate) fn upstream_message(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body)
        && let Some(message) = message_from_value(&value)
    {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

pub(crate) fn message_from_value(value: &Value) -> Option<String> {
    let candidates = [
        value.pointer("/error/message"),
        value.get("error"),
        value.get("message"),
        value.pointer("/output/message"),
        value.pointer("/data/error"),
        value.pointer("/result/error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.trim().is_empty())
}

/// Credential resolution plus the HTTP client used for every provider call.
pub struct ProviderProxy {
    registry: ProviderRegistry,
    client: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
    poll: ImagePollConfig,
}

impl ProviderProxy {
    pub fn new(registry: ProviderRegistry, poll: ImagePollConfig) -> Result<Self, ApiError> {
        Self::with_sleeper(registry, poll, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        registry: ProviderRegistry,
        poll: ImagePollConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            registry,
            client,
            sleeper,
            poll,
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn resolve(&self, request: ProviderAuthRequest) -> Result<ResolvedProvider, ApiError> {
        resolve_provider_auth(&self.registry, request).await
    }

    /// `GET <baseUrl>/models` with the stored key.
    pub async fn test_provider(&self, id: &str) -> Result<ProviderTestResult, ApiError> {
        let resolved = self
            .resolve(ProviderAuthRequest {
                provider_id: Some(id.to_string()),
                ..Default::default()
            })
            .await?;

        let response = self
            .client
            .get(resolved.endpoint("models"))
            .bearer_auth(resolved.api_key.expose_secret())
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| ApiError::ProviderTestFailed {
                status: 502,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            tracing::warn!(provider = id, status, "Provider test failed");
            return Err(ApiError::ProviderTestFailed {
                status,
                message: upstream_message(&body, "provider rejected the request"),
            });
        }

        let models = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("data").and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();

        Ok(ProviderTestResult {
            ok: true,
            status,
            models,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderTestResult {
    pub ok: bool,
    pub status: u16,
    pub models: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry_with(providers: Value, secrets: Value) -> (tempfile::TempDir, ProviderRegistry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROVIDERS_FILE), providers.to_string()).unwrap();
        std::fs::write(dir.path().join(PROVIDER_SECRETS_FILE), secrets.to_string()).unwrap();
        let registry = ProviderRegistry::new(dir.path());
        (dir, registry)
    }

    fn sample() -> (tempfile::TempDir, ProviderRegistry) {
        registry_with(
            json!({"providers": [
                {"id": "openai", "baseUrl": "https://api.example.com/v1", "models": ["gpt"]},
                {"id": "nokey", "baseUrl": "https://nokey.example.com"}
            ]}),
            json!({"secrets": {"openai": "sk-1"}}),
        )
    }

    #[tokio::test]
    async fn resolves_registered_provider() {
        let (_dir, registry) = sample();
        let resolved = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                provider_id: Some("openai".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.base_url, "https://api.example.com/v1");
        assert_eq!(resolved.api_key.expose_secret(), "sk-1");
        assert_eq!(
            resolved.endpoint("/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn unknown_and_keyless_providers_fail() {
        let (_dir, registry) = sample();
        let err = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                provider_id: Some("ghost".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code().as_str(), "provider_not_found");

        let err = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                provider_id: Some("nokey".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code().as_str(), "provider_missing_key");
    }

    #[tokio::test]
    async fn overrides_only_apply_with_fallback() {
        let (_dir, registry) = sample();
        let request = ProviderAuthRequest {
            provider_id: Some("ghost".into()),
            base_url: Some("https://override".into()),
            api_key: Some("sk-o".into()),
            allow_fallback: false,
        };
        assert!(resolve_provider_auth(&registry, request.clone()).await.is_err());

        let resolved = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                allow_fallback: true,
                ..request
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.base_url, "https://override");
    }

    #[tokio::test]
    async fn no_provider_id_requires_both_overrides() {
        let (_dir, registry) = sample();
        let err = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                base_url: Some("https://x".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code().as_str(), "invalid_provider");

        let resolved = resolve_provider_auth(
            &registry,
            ProviderAuthRequest {
                base_url: Some("https://x".into()),
                api_key: Some("k".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.base_url, "https://x");
    }

    #[tokio::test]
    async fn list_reports_key_presence_without_the_key() {
        let (_dir, registry) = sample();
        let items = registry.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].has_key);
        assert!(!items[1].has_key);
        let rendered = serde_json::to_string(&items).unwrap();
        assert!(!rendered.contains("sk-1"));
        assert!(rendered.contains("\"modelCatalog\":[\"gpt\"]"));
    }

    #[test]
    fn credential_fields_are_removed_from_payload() {
        let mut body = json!({
            "providerId": "openai",
            "apiKey": " ",
            "allowFallback": true,
            "model": "gpt"
        })
        .as_object()
        .cloned()
        .unwrap();
        let auth = ProviderAuthRequest::take_from(&mut body);
        assert_eq!(auth.provider_id.as_deref(), Some("openai"));
        assert!(auth.api_key.is_none());
        assert!(auth.allow_fallback);
        assert_eq!(Value::Object(body), json!({"model": "gpt"}));
    }

    #[test]
    fn upstream_message_prefers_structured_error() {
        assert_eq!(
            upstream_message(r#"{"error":{"message":"bad key"}}"#, "x"),
            "bad key"
        );
        assert_eq!(upstream_message("plain text", "x"), "plain text");
        assert_eq!(upstream_message("", "fallback"), "fallback");
    }
}
