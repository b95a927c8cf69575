//! Action audit log.
//!
//! Every work item's reported outcome is written here once. The engine
//! emits the item's logged-signal when the write returns.

use crate::error::Result;
use crate::model::work::{WorkItem, WorkKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable sink for action outcomes.
#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn record(&self, entry: &ActionEntry) -> Result<()>;
}

/// How an action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    /// Queued in the deferred store for a later attempt.
    Deferred,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
            ActionStatus::Deferred => "deferred",
        };
        write!(f, "{s}")
    }
}

/// One audited action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub uuid: Uuid,
    pub kind: WorkKind,
    pub status: ActionStatus,
    pub payload: serde_json::Value,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ActionEntry {
    pub fn new(uuid: Uuid, kind: WorkKind, status: ActionStatus, payload: serde_json::Value) -> Self {
        Self {
            uuid,
            kind,
            status,
            payload,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn succeeded(item: &WorkItem) -> Self {
        Self::new(item.uuid(), item.kind(), ActionStatus::Succeeded, item_payload(item))
    }

    pub fn failed(item: &WorkItem, error: &crate::error::Error) -> Self {
        Self::new(item.uuid(), item.kind(), ActionStatus::Failed, item_payload(item))
            .with_error(error.to_string())
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn item_payload(item: &WorkItem) -> serde_json::Value {
    serde_json::to_value(&item.task).unwrap_or(serde_json::Value::Null)
}
