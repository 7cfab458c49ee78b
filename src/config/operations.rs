//! Config loading, validation and lookup.

use super::model::{AgentEntry, PoolConfig, RawPoolConfig};
use crate::agent::{AgentDescriptor, Provider, Role};
use crate::error::{CrewError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// Environment variable that replaces `queue.url`.
pub const QUEUE_URL_ENV: &str = "CREW_QUEUE_URL";

const DEFAULT_PROJECT: &str = "agentcrew";

static AGENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("Invalid agent name regex"));

static BRANCH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").expect("Invalid branch prefix regex")
});

impl PoolConfig {
    /// Load and validate the pool configuration from a YAML file.
    ///
    /// A missing file is a configuration error: nothing in the pool can run
    /// without it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CrewError::ConfigError(format!(
                "agent pool configuration not found at '{}'\n\n\
                 Create it with at least a planner and one executor, e.g.:\n\
                 agents:\n  \
                   - name: planner\n    role: planner\n    provider: claude\n  \
                   - name: executor-1\n    role: executor\n    provider: codex",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CrewError::ConfigError(format!("failed to read '{}': {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate the pool configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawPoolConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CrewError::ConfigError(format!("failed to parse agents.yaml: {}", e)))?;

        validate_roles(&raw.agents)?;
        validate_settings(&raw)?;

        let mut seen = HashSet::new();
        let mut agents = Vec::with_capacity(raw.agents.len());
        let mut image_overrides = BTreeMap::new();

        for entry in raw.agents {
            if !seen.insert(entry.name.clone()) {
                return Err(CrewError::ConfigError(format!(
                    "agent name '{}' is used more than once",
                    entry.name
                )));
            }
            if let Some(image) = entry.image.clone() {
                image_overrides.insert(entry.name.clone(), image);
            }
            agents.push(descriptor_from_entry(entry)?);
        }

        Ok(Self {
            project: raw.project.unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            agents,
            image_overrides,
            queue: raw.queue,
            worker: raw.worker,
            git: raw.git,
            runtime: raw.runtime,
        })
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(QUEUE_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.queue.url = url;
        }
        self
    }

    /// Look up an agent by name.
    pub fn agent(&self, name: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Look up an agent by name, failing with [`CrewError::UnknownAgent`].
    pub fn require_agent(&self, name: &str) -> Result<&AgentDescriptor> {
        self.agent(name).ok_or_else(|| CrewError::UnknownAgent {
            name: name.to_string(),
            available: self.agent_names().join(", "),
        })
    }

    /// Agent names in configuration order.
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }

    /// Agents with the given role.
    pub fn agents_with_role(&self, role: Role) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter().filter(move |a| a.role == role)
    }

    /// Runtime image for an agent.
    pub fn image_for(&self, agent_name: &str) -> &str {
        self.image_overrides
            .get(agent_name)
            .map(String::as_str)
            .unwrap_or(&self.runtime.image)
    }
}

fn descriptor_from_entry(entry: AgentEntry) -> Result<AgentDescriptor> {
    if !AGENT_NAME_RE.is_match(&entry.name) {
        return Err(CrewError::ConfigError(format!(
            "invalid agent name '{}': use lowercase letters, digits, '-' and '_'",
            entry.name
        )));
    }

    let provider = Provider::resolve(&entry.provider, entry.command.as_deref()).map_err(|e| {
        CrewError::ConfigError(format!("agent '{}': {}", entry.name, strip_prefix(&e)))
    })?;

    let branch_prefix = match (entry.role, entry.branch_prefix) {
        (Role::Executor, Some(prefix)) => {
            if !is_valid_branch_prefix(&prefix) {
                return Err(CrewError::ConfigError(format!(
                    "agent '{}': invalid branch_prefix '{}'",
                    entry.name, prefix
                )));
            }
            Some(prefix)
        }
        (Role::Executor, None) => None,
        (role, Some(_)) => {
            return Err(CrewError::ConfigError(format!(
                "agent '{}': branch_prefix is only valid for executors, not {}",
                entry.name, role
            )));
        }
        (_, None) => None,
    };

    Ok(AgentDescriptor {
        name: entry.name,
        role: entry.role,
        provider,
        model: entry.model.filter(|m| !m.trim().is_empty()),
        branch_prefix,
    })
}

fn validate_roles(agents: &[AgentEntry]) -> Result<()> {
    let count = |role: Role| agents.iter().filter(|a| a.role == role).count();

    if agents.is_empty() {
        return Err(CrewError::ConfigError(
            "no agents configured".to_string(),
        ));
    }
    match count(Role::Planner) {
        0 => {
            return Err(CrewError::ConfigError(
                "missing required role 'planner'".to_string(),
            ));
        }
        1 => {}
        n => {
            return Err(CrewError::ConfigError(format!(
                "exactly one planner is allowed, found {}",
                n
            )));
        }
    }
    if count(Role::Executor) == 0 {
        return Err(CrewError::ConfigError(
            "missing required role 'executor' (configure at least one)".to_string(),
        ));
    }
    if count(Role::Tester) > 1 {
        return Err(CrewError::ConfigError(format!(
            "at most one tester is allowed, found {}",
            count(Role::Tester)
        )));
    }
    Ok(())
}

fn validate_settings(raw: &RawPoolConfig) -> Result<()> {
    let checks = [
        ("queue.poll_timeout_seconds", raw.queue.poll_timeout_seconds),
        (
            "queue.dispatch_timeout_seconds",
            raw.queue.dispatch_timeout_seconds,
        ),
        ("queue.response_ttl_seconds", raw.queue.response_ttl_seconds),
        (
            "worker.execution_timeout_seconds",
            raw.worker.execution_timeout_seconds,
        ),
    ];
    for (field, value) in checks {
        if value == 0 {
            return Err(CrewError::ConfigError(format!(
                "{} must be greater than 0",
                field
            )));
        }
    }

    if raw.queue.url.trim().is_empty() {
        return Err(CrewError::ConfigError("queue.url must not be empty".to_string()));
    }
    if raw.runtime.container_prefix.is_empty() {
        return Err(CrewError::ConfigError(
            "runtime.container_prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn is_valid_branch_prefix(prefix: &str) -> bool {
    BRANCH_PREFIX_RE.is_match(prefix)
        && !prefix.contains("..")
        && !prefix.contains("//")
        && !prefix.ends_with('/')
        && !prefix.ends_with(".lock")
}

/// Provider errors already say "configuration error: ..."; avoid repeating it.
fn strip_prefix(err: &CrewError) -> String {
    match err {
        CrewError::ConfigError(msg) => msg.clone(),
        other => other.to_string(),
    }
}
