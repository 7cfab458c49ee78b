//! Read-only views of the queues, plus the operator's `clear`.

use super::{QueueStore, task_queue_key};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::message::TaskMessage;
use serde::Serialize;
use tracing::{info, warn};

/// Pending task count for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub agent: String,
    pub key: String,
    pub depth: usize,
}

/// What `clear` should drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    Agent(String),
    All,
}

impl ClearTarget {
    /// `*` means every configured agent.
    pub fn parse(arg: &str) -> Self {
        match arg {
            "*" => ClearTarget::All,
            name => ClearTarget::Agent(name.to_string()),
        }
    }
}

/// Result of clearing one agent queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cleared {
    pub agent: String,
    /// Pending tasks dropped.
    pub discarded: usize,
}

/// Depth of every configured agent's queue, in configuration order.
pub fn status(config: &PoolConfig, store: &dyn QueueStore) -> Result<Vec<QueueDepth>> {
    config
        .agents
        .iter()
        .map(|agent| {
            let key = agent.queue_key();
            let depth = store.depth(&key)?;
            Ok(QueueDepth {
                agent: agent.name.clone(),
                key,
                depth,
            })
        })
        .collect()
}

/// Up to `count` pending tasks for `agent`, oldest first, without consuming
/// them. Entries that do not decode are skipped.
pub fn peek(
    config: &PoolConfig,
    store: &dyn QueueStore,
    agent: &str,
    count: usize,
) -> Result<Vec<TaskMessage>> {
    let descriptor = config.require_agent(agent)?;
    let key = descriptor.queue_key();

    let messages = store
        .peek(&key, count)?
        .iter()
        .filter_map(|payload| match TaskMessage::from_json(payload) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(queue = %key, error = %e, "skipping undecodable entry");
                None
            }
        })
        .collect();
    Ok(messages)
}

/// Drop pending tasks. Tasks already taken by a worker are unaffected.
pub fn clear(
    config: &PoolConfig,
    store: &dyn QueueStore,
    target: &ClearTarget,
) -> Result<Vec<Cleared>> {
    let agents: Vec<&str> = match target {
        ClearTarget::Agent(name) => vec![config.require_agent(name)?.name.as_str()],
        ClearTarget::All => config.agent_names(),
    };

    let mut cleared = Vec::with_capacity(agents.len());
    for agent in agents {
        let key = task_queue_key(agent);
        let discarded = store.depth(&key)?;
        store.delete(&key)?;
        if discarded > 0 {
            info!(agent, discarded, "cleared queue");
        }
        cleared.push(Cleared {
            agent: agent.to_string(),
            discarded,
        });
    }
    Ok(cleared)
}
