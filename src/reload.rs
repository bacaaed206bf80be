//! In-memory reload notifications.
//!
//! Every change that makes the engine's cached view of a workspace stale is
//! recorded here with a process-wide cursor. Clients poll with the last
//! cursor they saw and get back only newer events.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RELOAD_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadReason {
    Config,
    Plugins,
    Skills,
    Mcp,
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadTrigger {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ReloadTrigger {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            action: action.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadEvent {
    pub workspace_id: String,
    pub reason: ReloadReason,
    pub trigger: ReloadTrigger,
    pub timestamp: DateTime<Utc>,
    pub cursor: u64,
}

/// Result of a poll: the matching events plus the store's latest cursor.
/// `truncated` is set when events newer than the caller's cursor have
/// already been evicted; the caller should reload unconditionally.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadEventPage {
    pub items: Vec<ReloadEvent>,
    pub cursor: u64,
    pub truncated: bool,
}

struct Inner {
    last_cursor: u64,
    /// Highest cursor dropped to stay within capacity.
    evicted_through: u64,
    events: VecDeque<ReloadEvent>,
}

pub struct ReloadEventStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for ReloadEventStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RELOAD_CAPACITY)
    }
}

impl ReloadEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_cursor: 0,
                evicted_through: 0,
                events: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn record(
        &self,
        workspace_id: &str,
        reason: ReloadReason,
        trigger: ReloadTrigger,
    ) -> ReloadEvent {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_cursor += 1;
        let event = ReloadEvent {
            workspace_id: workspace_id.to_string(),
            reason,
            trigger,
            timestamp: Utc::now(),
            cursor: inner.last_cursor,
        };
        inner.events.push_back(event.clone());
        while inner.events.len() > self.capacity {
            if let Some(dropped) = inner.events.pop_front() {
                inner.evicted_through = dropped.cursor;
            }
        }
        tracing::debug!(
            workspace = workspace_id,
            cursor = event.cursor,
            reason = ?reason,
            "Recorded reload event"
        );
        event
    }

    /// Events for `workspace_id` with a cursor strictly greater than `since`.
    pub fn list(&self, workspace_id: &str, since: Option<u64>) -> ReloadEventPage {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let truncated = since.is_some_and(|since| since < inner.evicted_through);
        let since = since.unwrap_or(0);
        let items = inner
            .events
            .iter()
            .filter(|e| e.workspace_id == workspace_id && e.cursor > since)
            .cloned()
            .collect();
        ReloadEventPage {
            items,
            cursor: inner.last_cursor,
            truncated,
        }
    }

    /// Whether `workspace_id` got an event less than `window` ago.
    pub fn recorded_within(&self, workspace_id: &str, window: Duration) -> bool {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return false;
        };
        let cutoff = Utc::now() - window;
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .iter()
            .rev()
            .find(|e| e.workspace_id == workspace_id)
            .is_some_and(|e| e.timestamp > cutoff)
    }

    pub fn latest_cursor(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_cursor
    }
}
