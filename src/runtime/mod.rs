//! Agent runtime provisioning.
//!
//! One container per configured agent, all on a shared network with the
//! queue store. The engine is reached through [`ContainerRuntime`];
//! [`DockerCli`] drives any docker-compatible CLI.

mod docker;
mod provisioner;
pub mod spec;

#[cfg(test)]
mod tests;

use crate::error::Result;
use std::fmt;
use std::path::Path;

pub use docker::DockerCli;
pub use provisioner::{
    AgentProvision, DownSummary, ProvisionStatus, Provisioner, QueueProvision, UpSummary,
};
pub use spec::{ContainerSpec, Mount};

/// Observed state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    Stopped,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Running => f.write_str("running"),
            RuntimeStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// A container as reported by the engine. Queried on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRuntime {
    pub container_id: String,
    pub name: String,
    pub status: RuntimeStatus,
}

impl AgentRuntime {
    pub fn is_running(&self) -> bool {
        self.status == RuntimeStatus::Running
    }
}

/// Container engine operations the provisioner needs.
pub trait ContainerRuntime: Send + Sync {
    /// Engine name for messages.
    fn name(&self) -> &str;

    /// Fails with `Connectivity` when the engine cannot be reached.
    fn ping(&self) -> Result<()>;

    /// The container called `name`, if any.
    fn inspect(&self, name: &str) -> Result<Option<AgentRuntime>>;

    /// Every container whose name starts with `name_prefix`.
    fn list(&self, name_prefix: &str) -> Result<Vec<AgentRuntime>>;

    /// Start a detached container and return its id.
    fn run_detached(&self, spec: &ContainerSpec) -> Result<String>;

    /// Force-remove a container. Removing a missing container succeeds.
    fn remove(&self, name: &str) -> Result<()>;

    fn network_exists(&self, name: &str) -> Result<bool>;

    fn create_network(&self, name: &str) -> Result<()>;

    fn image_exists(&self, image: &str) -> Result<bool>;

    fn build_image(&self, context: &Path, tag: &str) -> Result<()>;
}
