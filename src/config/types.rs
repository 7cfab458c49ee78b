//! Configuration sections and their defaults.

use serde::{Deserialize, Serialize};

/// Queue store connection and timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Redis URL of the shared queue store.
    pub url: String,

    /// How long a worker blocks on its queue before re-checking for shutdown.
    pub poll_timeout_seconds: u64,

    /// Default ceiling for `dispatch --wait`.
    pub dispatch_timeout_seconds: u64,

    /// Expiry applied to a response queue after a response is published.
    pub response_ttl_seconds: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            poll_timeout_seconds: 5,
            dispatch_timeout_seconds: 600,
            response_ttl_seconds: 3600,
        }
    }
}

fn default_queue_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Worker loop behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Wall-clock limit for one tool invocation.
    pub execution_timeout_seconds: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            execution_timeout_seconds: 600,
        }
    }
}

/// Where executors push their branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Remote name used when no `push_url` is configured.
    pub remote: String,

    /// Explicit push URL. Credentials from `push_user`/`push_token_env` are
    /// embedded into it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,

    /// User name embedded into `push_url` (default `oauth2` when a token is set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_user: Option<String>,

    /// Name of the operator environment variable holding the push token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token_env: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            push_url: None,
            push_user: None,
            push_token_env: None,
        }
    }
}

/// Container engine and naming conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Docker-compatible CLI (`docker`, `podman`).
    pub engine: String,

    /// Image every agent runs unless overridden per agent.
    pub image: String,

    /// Directory (relative to the repo root) to build `image` from when missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_context: Option<String>,

    /// Shared network the agents and queue store join.
    pub network: String,

    /// Agent containers are named `<container_prefix><agent>`.
    pub container_prefix: String,

    /// Name of the queue store container.
    pub queue_container: String,

    /// Image of the queue store container.
    pub queue_image: String,

    /// Host port published for the queue store container.
    pub queue_port: u16,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            image: "agentcrew-agent:latest".to_string(),
            build_context: None,
            network: "agentcrew".to_string(),
            container_prefix: "crew-agent-".to_string(),
            queue_container: "crew-queue".to_string(),
            queue_image: "redis:7-alpine".to_string(),
            queue_port: 6379,
        }
    }
}
