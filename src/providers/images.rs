//! Image generation with support for task-based providers.
//!
//! Some providers answer `/images/generations` inline with the images;
//! others return a task id that has to be polled at `/tasks/{id}` until it
//! reaches a terminal state. Both shapes normalize to
//! `{data: [{b64_json?, url?}]}`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{ProviderAuthRequest, ProviderProxy, ResolvedProvider, message_from_value, upstream_message};
use crate::error::ApiError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;

/// Pause between task polls. Swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ImagePollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageGenerationResult {
    pub data: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One poll's view of an asynchronous generation task.
#[derive(Debug, Clone)]
pub struct ImageGenerationTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Value,
}

impl ImageGenerationTask {
    pub fn from_response(task_id: &str, value: Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: task_status(&value),
            result: value,
        }
    }
}

impl ProviderProxy {
    pub async fn generate_images(
        &self,
        mut body: Map<String, Value>,
    ) -> Result<ImageGenerationResult, ApiError> {
        let auth = ProviderAuthRequest::take_from(&mut body);
        let resolved = self.resolve(auth).await?;
        if !body.contains_key("model")
            && let Some(model) = &resolved.default_models.image
        {
            body.insert("model".to_string(), Value::String(model.clone()));
        }

        let response = self
            .client
            .post(resolved.endpoint("images/generations"))
            .bearer_auth(resolved.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::ProviderImageFailed {
                status: None,
                message: e.to_string(),
            })?;
        let initial = read_json(response).await?;

        let images = normalize_images(&initial);
        if !images.is_empty() {
            return Ok(ImageGenerationResult { data: images });
        }

        if let Some(task_id) = extract_task_id(&initial) {
            tracing::info!(task = %task_id, "Image provider returned a task, polling");
            return self.poll_task(&resolved, &task_id).await;
        }

        Err(ApiError::ProviderImageFailed {
            status: None,
            message: message_from_value(&initial)
                .unwrap_or_else(|| "Provider returned no images".to_string()),
        })
    }

    async fn poll_task(
        &self,
        resolved: &ResolvedProvider,
        task_id: &str,
    ) -> Result<ImageGenerationResult, ApiError> {
        let url = resolved.endpoint(&format!("tasks/{task_id}"));
        for attempt in 1..=self.poll.max_attempts {
            self.sleeper.sleep(self.poll.interval).await;

            let response = self
                .client
                .get(&url)
                .bearer_auth(resolved.api_key.expose_secret())
                .send()
                .await
                .map_err(|e| ApiError::ProviderImageFailed {
                    status: None,
                    message: e.to_string(),
                })?;
            let task = ImageGenerationTask::from_response(task_id, read_json(response).await?);

            match task.status {
                TaskStatus::Pending => {
                    tracing::debug!(task = %task_id, attempt, "Image task still running");
                }
                TaskStatus::Succeeded => {
                    let data = normalize_images(&task.result);
                    if data.is_empty() {
                        return Err(ApiError::ProviderImageFailed {
                            status: None,
                            message: "Image task finished without images".to_string(),
                        });
                    }
                    return Ok(ImageGenerationResult { data });
                }
                TaskStatus::Failed => {
                    tracing::warn!(task = %task.task_id, "Image task failed");
                    return Err(ApiError::ProviderImageFailed {
                        status: None,
                        message: message_from_value(&task.result)
                            .unwrap_or_else(|| "Image task failed".to_string()),
                    });
                }
            }
        }

        Err(ApiError::ProviderImageTimeout {
            task_id: task_id.to_string(),
            attempts: self.poll.max_attempts,
        })
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::ProviderImageFailed {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
    if !status.is_success() {
        return Err(ApiError::ProviderImageFailed {
            status: Some(status.as_u16()),
            message: upstream_message(&text, "provider rejected the image request"),
        });
    }
    serde_json::from_str(&text).map_err(|_| ApiError::ProviderImageFailed {
        status: Some(status.as_u16()),
        message: "Provider returned invalid JSON".to_string(),
    })
}

fn extract_task_id(value: &Value) -> Option<String> {
    [
        value.get("task_id"),
        value.get("taskId"),
        value.pointer("/output/task_id"),
        value.pointer("/data/task_id"),
        value.pointer("/data/taskId"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
    .or_else(|| {
        // A bare `id` only counts as a task id next to a status field.
        let status = value.get("status").or_else(|| value.get("task_status"));
        match (value.get("id"), status) {
            (Some(Value::String(id)), Some(_)) if !id.trim().is_empty() => {
                Some(id.trim().to_string())
            }
            _ => None,
        }
    })
}

fn task_status(value: &Value) -> TaskStatus {
    let raw = [
        value.get("status"),
        value.get("task_status"),
        value.pointer("/output/task_status"),
        value.pointer("/data/status"),
        value.pointer("/result/status"),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_str)
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();

    match raw.as_str() {
        "succeeded" | "success" | "succeed" | "completed" | "complete" | "done" | "finished" => {
            TaskStatus::Succeeded
        }
        "failed" | "failure" | "error" | "cancelled" | "canceled" | "expired" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

/// Collect images from the shapes providers are known to use.
pub fn normalize_images(value: &Value) -> Vec<GeneratedImage> {
    let lists = [
        value.get("data"),
        value.pointer("/data/images"),
        value.pointer("/data/data"),
        value.get("images"),
        value.get("result"),
        value.pointer("/result/data"),
        value.pointer("/result/images"),
        value.pointer("/output/results"),
        value.pointer("/output/images"),
    ];
    for list in lists.into_iter().flatten() {
        if let Some(items) = list.as_array() {
            let images: Vec<GeneratedImage> = items.iter().filter_map(image_from_item).collect();
            if !images.is_empty() {
                return images;
            }
        }
    }
    Vec::new()
}

fn image_from_item(item: &Value) -> Option<GeneratedImage> {
    match item {
        Value::String(s) if is_url(s) => Some(GeneratedImage {
            b64_json: None,
            url: Some(s.clone()),
        }),
        Value::String(s) if !s.is_empty() => Some(GeneratedImage {
            b64_json: Some(s.clone()),
            url: None,
        }),
        Value::Object(map) => {
            let pick = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let url = pick(&["url", "image_url", "imageUrl"]);
            let b64_json = pick(&["b64_json", "b64", "base64"]);
            (url.is_some() || b64_json.is_some()).then_some(GeneratedImage { b64_json, url })
        }
        _ => None,
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("data:")
}
