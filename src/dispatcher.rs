//! Enqueue tasks for agents and optionally wait for their reply.

use crate::config::PoolConfig;
use crate::error::{CrewError, Result};
use crate::message::{META_AUTO_APPROVE, META_PROJECT_PATH, TaskMessage};
use crate::queue::{QueueStore, response_queue_key};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a task should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Sender recorded in the message; replies are addressed back to it.
    pub from: String,
    /// Block for the reply.
    pub wait: bool,
    /// Ceiling for the wait.
    pub timeout: Duration,
    pub auto_approve: bool,
    /// Directory inside the agent's workspace to run the tool in.
    pub project_path: Option<String>,
}

impl DispatchOptions {
    /// Fire-and-forget options using the configured wait ceiling.
    pub fn from_config(config: &PoolConfig, from: &str) -> Self {
        Self {
            from: from.to_string(),
            wait: false,
            timeout: Duration::from_secs(config.queue.dispatch_timeout_seconds),
            auto_approve: false,
            project_path: None,
        }
    }
}

/// What happened to the reply, if one was requested.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    NotRequested,
    Received(TaskMessage),
    /// No reply within the timeout. The task is still queued or running.
    TimedOut,
}

/// Outcome of a dispatch. The task id is always known.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub task_id: String,
    pub response: DispatchResponse,
}

pub struct Dispatcher<'a> {
    config: &'a PoolConfig,
    store: &'a dyn QueueStore,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a PoolConfig, store: &'a dyn QueueStore) -> Self {
        Self { config, store }
    }

    /// Send `content` to `target`.
    ///
    /// The target is checked against the configuration before the store is
    /// touched. A push failure is returned as an error, never dropped.
    pub fn dispatch(
        &self,
        target: &str,
        content: &str,
        options: &DispatchOptions,
    ) -> Result<DispatchReceipt> {
        let agent = self.config.require_agent(target)?;

        if content.trim().is_empty() {
            return Err(CrewError::UserError(
                "task content is empty; nothing to dispatch".to_string(),
            ));
        }

        let mut task = TaskMessage::task(&options.from, &agent.name, content);
        if options.auto_approve {
            task = task.with_metadata(META_AUTO_APPROVE, true);
        }
        if let Some(path) = options.project_path.as_deref() {
            task = task.with_metadata(META_PROJECT_PATH, path);
        }

        let payload = task.to_json()?;
        self.store.push(&agent.queue_key(), &payload)?;
        info!(task_id = %task.id, to = %agent.name, from = %task.from, "task dispatched");

        if !options.wait {
            return Ok(DispatchReceipt {
                task_id: task.id,
                response: DispatchResponse::NotRequested,
            });
        }

        let response = self.await_response(&task.id, options.timeout)?;
        Ok(DispatchReceipt {
            task_id: task.id,
            response,
        })
    }

    /// Wait up to `timeout` for the reply to `task_id`.
    pub fn await_response(&self, task_id: &str, timeout: Duration) -> Result<DispatchResponse> {
        let key = response_queue_key(task_id);
        debug!(task_id, timeout_secs = timeout.as_secs_f64(), "waiting for response");

        let Some(payload) = self.store.blocking_pop(&key, timeout)? else {
            warn!(task_id, "no response within {:?}", timeout);
            return Ok(DispatchResponse::TimedOut);
        };

        let reply = TaskMessage::from_json(&payload)?;
        if !reply.is_reply() {
            return Err(CrewError::MessageError(format!(
                "message {} on {} is a {}, not a reply",
                reply.id, key, reply.kind
            )));
        }
        if reply.in_response_to() != Some(task_id) {
            return Err(CrewError::MessageError(format!(
                "response {} on {} answers {:?}, expected task {}",
                reply.id,
                key,
                reply.in_response_to(),
                task_id
            )));
        }
        Ok(DispatchResponse::Received(reply))
    }
}
