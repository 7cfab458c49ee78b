//! Brings the agent pool up and tears it down.
//!
//! `up` is idempotent: running containers are left alone, stopped ones are
//! recreated, and a failure for one agent never stops the others.

use super::spec::{
    AgentMounts, agent_container_name, agent_spec, in_network_queue_url, queue_spec,
};
use super::ContainerRuntime;
use crate::agent::AgentDescriptor;
use crate::config::PoolConfig;
use crate::context::ProjectContext;
use crate::error::{CrewError, Result};
use crate::git;
use crate::workspace;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened to the queue store during `up`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueProvision {
    /// Queue provisioning was turned off for this run.
    Skipped,
    /// The configured store already answered a probe.
    Reachable,
    AlreadyRunning { id: String },
    Started { id: String },
    Failed { reason: String },
}

impl QueueProvision {
    /// Whether agents reach the store through the shared network.
    fn in_network(&self) -> bool {
        matches!(
            self,
            QueueProvision::AlreadyRunning { .. } | QueueProvision::Started { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    AlreadyRunning { id: String },
    Started { id: String },
    Failed { reason: String },
}

/// Result for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProvision {
    pub agent: String,
    pub container: String,
    pub status: ProvisionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpSummary {
    pub network_created: bool,
    pub queue: QueueProvision,
    pub agents: Vec<AgentProvision>,
    pub images_built: Vec<String>,
}

impl UpSummary {
    pub fn failures(&self) -> impl Iterator<Item = &AgentProvision> {
        self.agents
            .iter()
            .filter(|a| matches!(a.status, ProvisionStatus::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && !matches!(self.queue, QueueProvision::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownSummary {
    pub removed: Vec<String>,
    /// Containers that could not be removed, with the reason.
    pub failed: Vec<(String, String)>,
    pub queue_removed: bool,
}

type EnvLookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;
type QueueProbe<'a> = Box<dyn Fn() -> bool + 'a>;

pub struct Provisioner<'a> {
    config: &'a PoolConfig,
    ctx: &'a ProjectContext,
    runtime: &'a dyn ContainerRuntime,
    provision_queue: bool,
    queue_probe: Option<QueueProbe<'a>>,
    home: Option<PathBuf>,
    env: EnvLookup<'a>,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a PoolConfig,
        ctx: &'a ProjectContext,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            config,
            ctx,
            runtime,
            provision_queue: true,
            queue_probe: None,
            home: std::env::var_os("HOME").map(PathBuf::from),
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Probe used to detect a queue store that is already reachable.
    pub fn with_queue_probe(mut self, probe: impl Fn() -> bool + 'a) -> Self {
        self.queue_probe = Some(Box::new(probe));
        self
    }

    /// Leave the queue store alone.
    pub fn without_queue(mut self) -> Self {
        self.provision_queue = false;
        self
    }

    /// Home directory credentials are mounted from.
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Where provider secrets are read from.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + 'a) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// Provision network, queue store and one container per agent.
    pub fn up(&self) -> Result<UpSummary> {
        self.runtime.ping()?;

        let network = &self.config.runtime.network;
        let network_created = if self.runtime.network_exists(network)? {
            false
        } else {
            self.runtime.create_network(network)?;
            info!(network = %network, "network created");
            true
        };

        let queue = if self.provision_queue {
            self.provision_queue_store()
        } else {
            QueueProvision::Skipped
        };
        let queue_url = if queue.in_network() {
            in_network_queue_url(self.config)
        } else {
            self.config.queue.url.clone()
        };

        let git_common_dir = git::get_common_dir(&self.ctx.repo_root)?;
        let mut images = ImageCache::default();
        let mut agents = Vec::with_capacity(self.config.agents.len());

        for agent in &self.config.agents {
            let container = agent_container_name(self.config, &agent.name);
            let provisioned = self.provision_agent(
                agent,
                &container,
                &queue_url,
                &git_common_dir,
                &mut images,
            );
            let status = match provisioned {
                Ok(status) => status,
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "failed to provision agent");
                    ProvisionStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            agents.push(AgentProvision {
                agent: agent.name.clone(),
                container,
                status,
            });
        }

        Ok(UpSummary {
            network_created,
            queue,
            agents,
            images_built: images.built,
        })
    }

    /// Remove every agent container carrying the configured prefix, and the
    /// queue store container when asked.
    pub fn down(&self, with_queue: bool) -> Result<DownSummary> {
        self.runtime.ping()?;

        let prefix = &self.config.runtime.container_prefix;
        let pattern = agent_container_pattern(prefix)?;
        let mut summary = DownSummary::default();

        for container in self.runtime.list(prefix)? {
            if !pattern.is_match(&container.name) {
                continue;
            }
            match self.runtime.remove(&container.name) {
                Ok(()) => {
                    info!(container = %container.name, "container removed");
                    summary.removed.push(container.name);
                }
                Err(e) => {
                    warn!(container = %container.name, error = %e, "failed to remove container");
                    summary.failed.push((container.name, e.to_string()));
                }
            }
        }

        if with_queue {
            let queue = &self.config.runtime.queue_container;
            if self.runtime.inspect(queue)?.is_some() {
                self.runtime.remove(queue)?;
                info!(container = %queue, "queue container removed");
                summary.queue_removed = true;
            }
        }

        Ok(summary)
    }

    fn provision_queue_store(&self) -> QueueProvision {
        match self.try_provision_queue_store() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "failed to provision queue store");
                QueueProvision::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_provision_queue_store(&self) -> Result<QueueProvision> {
        let name = &self.config.runtime.queue_container;
        match self.runtime.inspect(name)? {
            Some(existing) if existing.is_running() => {
                return Ok(QueueProvision::AlreadyRunning {
                    id: existing.container_id,
                });
            }
            Some(_) => {
                // A stopped queue container would block the name; start fresh.
                self.runtime.remove(name)?;
            }
            None => {}
        }

        if self.queue_probe.as_ref().is_some_and(|probe| probe()) {
            return Ok(QueueProvision::Reachable);
        }

        let id = self.runtime.run_detached(&queue_spec(self.config))?;
        info!(container = %name, id = %short_id(&id), "queue store started");
        Ok(QueueProvision::Started { id })
    }

    fn provision_agent(
        &self,
        agent: &AgentDescriptor,
        container: &str,
        queue_url: &str,
        git_common_dir: &Path,
        images: &mut ImageCache,
    ) -> Result<ProvisionStatus> {
        match self.runtime.inspect(container)? {
            Some(existing) if existing.is_running() => {
                info!(agent = %agent.name, container, "already running");
                return Ok(ProvisionStatus::AlreadyRunning {
                    id: existing.container_id,
                });
            }
            Some(_) => {
                info!(agent = %agent.name, container, "removing stopped container");
                self.runtime.remove(container)?;
            }
            None => {}
        }

        let image = self.config.image_for(&agent.name);
        images.ensure(self.runtime, image, self.build_context().as_deref())?;

        let workspace = workspace::ensure(self.ctx, agent)?;
        let mounts = AgentMounts {
            workspace: &workspace.path,
            shared_dir: &self.ctx.shared_dir,
            git_common_dir,
            home: self.home.as_deref(),
        };
        let spec = agent_spec(self.config, agent, &mounts, queue_url, |key| (self.env)(key));

        let id = self.runtime.run_detached(&spec)?;
        info!(agent = %agent.name, container, id = %short_id(&id), "agent started");
        Ok(ProvisionStatus::Started { id })
    }

    fn build_context(&self) -> Option<PathBuf> {
        self.config
            .runtime
            .build_context
            .as_ref()
            .map(|dir| self.ctx.repo_root.join(dir))
    }
}

/// Images checked or built during one `up`, so each is handled once.
#[derive(Default)]
struct ImageCache {
    /// Image -> failure reason, `None` when available.
    checked: BTreeMap<String, Option<String>>,
    built: Vec<String>,
}

impl ImageCache {
    fn ensure(
        &mut self,
        runtime: &dyn ContainerRuntime,
        image: &str,
        build_context: Option<&Path>,
    ) -> Result<()> {
        if let Some(outcome) = self.checked.get(image) {
            return match outcome {
                None => Ok(()),
                Some(reason) => Err(CrewError::RuntimeError(reason.clone())),
            };
        }

        let outcome = self.resolve(runtime, image, build_context);
        let failure = outcome.as_ref().err().map(|e| match e {
            CrewError::RuntimeError(message) => message.clone(),
            other => other.to_string(),
        });
        self.checked.insert(image.to_string(), failure);
        outcome
    }

    fn resolve(
        &mut self,
        runtime: &dyn ContainerRuntime,
        image: &str,
        build_context: Option<&Path>,
    ) -> Result<()> {
        if runtime.image_exists(image)? {
            return Ok(());
        }
        let Some(context) = build_context else {
            return Err(CrewError::RuntimeError(format!(
                "image '{}' not found\n\
                 Fix: pull or build it, or set runtime.build_context in agents.yaml.",
                image
            )));
        };

        info!(image, context = %context.display(), "building image");
        runtime.build_image(context, image)?;
        self.built.push(image.to_string());
        Ok(())
    }
}

fn agent_container_pattern(prefix: &str) -> Result<Regex> {
    Regex::new(&format!("^{}[a-z0-9][a-z0-9_-]*$", regex::escape(prefix))).map_err(|e| {
        CrewError::ConfigError(format!("invalid container prefix '{}': {}", prefix, e))
    })
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
