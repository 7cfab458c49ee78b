//! Pool configuration structs.

use super::types::*;
use crate::agent::AgentDescriptor;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One agent as written in `agents.yaml`, before provider resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    pub role: crate::agent::Role,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub branch_prefix: Option<String>,
    /// Command template, `custom` provider only.
    #[serde(default)]
    pub command: Option<String>,
    /// Image override for this agent's runtime.
    #[serde(default)]
    pub image: Option<String>,
}

/// `agents.yaml` as parsed. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPoolConfig {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

/// The validated agent pool, loaded once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Project label attached to containers.
    pub project: String,

    /// Agents in configuration order.
    pub agents: Vec<AgentDescriptor>,

    /// Runtime image overrides keyed by agent name.
    pub image_overrides: BTreeMap<String, String>,

    pub queue: QueueSettings,
    pub worker: WorkerSettings,
    pub git: GitSettings,
    pub runtime: RuntimeSettings,
}
