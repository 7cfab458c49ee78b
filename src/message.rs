//! The queue wire format.
//!
//! A [`TaskMessage`] is serialized as one JSON document per queue entry.
//! Metadata keys are camelCase; keys this crate does not know about are
//! preserved as-is.

use crate::error::{CrewError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Metadata key correlating a reply with its task id.
pub const META_IN_RESPONSE_TO: &str = "inResponseTo";
/// Working directory relative to the agent's workspace.
pub const META_PROJECT_PATH: &str = "projectPath";
/// Run the tool without asking for confirmation.
pub const META_AUTO_APPROVE: &str = "autoApprove";
pub const META_EXIT_CODE: &str = "exitCode";
pub const META_DURATION_MS: &str = "durationMs";
pub const META_TIMED_OUT: &str = "timedOut";
pub const META_BRANCH: &str = "branch";
pub const META_COMMIT: &str = "commit";
pub const META_PUSHED: &str = "pushed";
pub const META_PERSIST_WARNING: &str = "persistWarning";

/// Kind of queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Task,
    Response,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Task => "task",
            MessageType::Response => "response",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work or one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl TaskMessage {
    fn new(kind: MessageType, from: &str, to: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            metadata: BTreeMap::new(),
        }
    }

    /// A new task addressed to `to`.
    pub fn task(from: &str, to: &str, content: &str) -> Self {
        Self::new(MessageType::Task, from, to, content)
    }

    /// A successful reply to `task`, addressed back to its sender.
    pub fn response_to(task: &TaskMessage, from: &str, content: &str) -> Self {
        Self::new(MessageType::Response, from, &task.from, content)
            .with_metadata(META_IN_RESPONSE_TO, task.id.clone())
    }

    /// A failure reply to `task`, addressed back to its sender.
    pub fn error_to(task: &TaskMessage, from: &str, content: &str) -> Self {
        Self::new(MessageType::Error, from, &task.from, content)
            .with_metadata(META_IN_RESPONSE_TO, task.id.clone())
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Id of the task this message answers, if it is a reply.
    pub fn in_response_to(&self) -> Option<&str> {
        self.metadata.get(META_IN_RESPONSE_TO).and_then(Value::as_str)
    }

    /// True only for an explicit boolean `true`.
    pub fn auto_approve(&self) -> bool {
        matches!(self.metadata.get(META_AUTO_APPROVE), Some(Value::Bool(true)))
    }

    pub fn project_path(&self) -> Option<&str> {
        self.metadata
            .get(META_PROJECT_PATH)
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
    }

    pub fn is_reply(&self) -> bool {
        matches!(self.kind, MessageType::Response | MessageType::Error)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            CrewError::MessageError(format!("failed to encode message {}: {}", self.id, e))
        })
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| CrewError::MessageError(format!("malformed queue payload: {}", e)))
    }
}
