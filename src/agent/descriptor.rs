//! Agent roles and the immutable per-agent descriptor.

use super::provider::Provider;
use crate::queue::task_queue_key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch prefix used for executor workspaces when none is configured.
pub const DEFAULT_BRANCH_PREFIX: &str = "executor";

/// The part an agent plays in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Executor,
    Tester,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Executor => "executor",
            Role::Tester => "tester",
        }
    }

    /// Whether agents of this role get a private worktree and commit their
    /// changes after each task.
    pub fn owns_workspace(&self) -> bool {
        matches!(self, Role::Executor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one agent, resolved once from `agents.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: Role,
    pub provider: Provider,
    pub model: Option<String>,
    /// Executors only.
    pub branch_prefix: Option<String>,
}

impl AgentDescriptor {
    /// Private branch for this agent's workspace (`<prefix>/<name>`), or
    /// `None` for roles that work in the main checkout.
    pub fn workspace_branch(&self) -> Option<String> {
        if !self.role.owns_workspace() {
            return None;
        }
        let prefix = self
            .branch_prefix
            .as_deref()
            .unwrap_or(DEFAULT_BRANCH_PREFIX);
        Some(format!("{}/{}", prefix, self.name))
    }

    /// Queue key this agent's worker consumes.
    pub fn queue_key(&self) -> String {
        task_queue_key(&self.name)
    }
}
