//! Implementation of the `crew up` and `crew down` commands.

use super::Session;
use crate::cli::{DownArgs, UpArgs};
use crate::error::{CrewError, Result};
use crate::queue::{QueueStore, RedisQueueStore};
use crate::runtime::{DockerCli, ProvisionStatus, Provisioner, QueueProvision};
use std::path::PathBuf;

pub fn cmd_up(config_path: Option<PathBuf>, args: UpArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let runtime = DockerCli::new(&session.config.runtime.engine);
    let queue_url = session.config.queue.url.clone();

    let mut provisioner = Provisioner::new(&session.config, &session.ctx, &runtime)
        .with_queue_probe(move || {
            RedisQueueStore::connect(&queue_url)
                .and_then(|store| store.ping())
                .is_ok()
        });
    if args.no_queue {
        provisioner = provisioner.without_queue();
    }

    let summary = provisioner.up()?;

    if summary.network_created {
        println!("Created network {}", session.config.runtime.network);
    }
    let queue_name = &session.config.runtime.queue_container;
    match &summary.queue {
        QueueProvision::Skipped => {}
        QueueProvision::Reachable => {
            println!("Queue store reachable at {}", session.config.queue.url)
        }
        QueueProvision::AlreadyRunning { .. } => {
            println!("Queue store {} already running", queue_name)
        }
        QueueProvision::Started { .. } => println!("Started queue store {}", queue_name),
        QueueProvision::Failed { reason } => {
            println!("Queue store {} failed: {}", queue_name, reason)
        }
    }
    for image in &summary.images_built {
        println!("Built image {}", image);
    }

    println!();
    for agent in &summary.agents {
        let status = match &agent.status {
            ProvisionStatus::AlreadyRunning { .. } => "already running".to_string(),
            ProvisionStatus::Started { id } => format!("started ({})", short(id)),
            ProvisionStatus::Failed { reason } => format!("FAILED: {}", reason),
        };
        println!("  {:<20} {:<28} {}", agent.agent, agent.container, status);
    }

    if summary.is_success() {
        return Ok(());
    }

    let failed = summary.failures().count();
    Err(CrewError::RuntimeError(format!(
        "{} of {} agents failed to start{}",
        failed,
        summary.agents.len(),
        if matches!(summary.queue, QueueProvision::Failed { .. }) {
            " and the queue store could not be started"
        } else {
            ""
        }
    )))
}

pub fn cmd_down(config_path: Option<PathBuf>, args: DownArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let runtime = DockerCli::new(&session.config.runtime.engine);
    let summary = Provisioner::new(&session.config, &session.ctx, &runtime).down(args.with_queue)?;

    if summary.removed.is_empty() && !summary.queue_removed && summary.failed.is_empty() {
        println!("No agent containers to remove");
        return Ok(());
    }
    for name in &summary.removed {
        println!("Removed {}", name);
    }
    if summary.queue_removed {
        println!("Removed {}", session.config.runtime.queue_container);
    }
    for (name, reason) in &summary.failed {
        println!("Failed to remove {}: {}", name, reason);
    }

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(CrewError::RuntimeError(format!(
            "{} containers could not be removed",
            summary.failed.len()
        )))
    }
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
