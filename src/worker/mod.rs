//! The per-agent worker loop.
//!
//! A worker consumes `queue:<agent>` strictly in order: pop one task, run the
//! agent's tool, commit and push (executors only), publish exactly one reply,
//! then pop the next. The operator's interrupt is honoured only between
//! tasks, so a task that was taken is always answered.

pub mod executor;
mod shutdown;


use crate::agent::AgentDescriptor;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::message::{
    META_BRANCH, META_COMMIT, META_DURATION_MS, META_EXIT_CODE, META_PERSIST_WARNING,
    META_PUSHED, META_TIMED_OUT, MessageType, TaskMessage,
};
use crate::queue::{QueueStore, response_queue_key};
use crate::workspace::{PersistOutcome, PushTarget, Workspace, persist_changes};
use executor::{ExecutionResult, build_instruction, execute, resolve_working_dir};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use shutdown::ShutdownSignal;

/// Environment variable naming the worker's workspace directory.
pub const WORKSPACE_ENV: &str = "CREW_WORKSPACE";

/// Timing knobs, taken from the pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub poll_timeout: Duration,
    pub execution_timeout: Duration,
    pub response_ttl: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            poll_timeout: Duration::from_secs(config.queue.poll_timeout_seconds),
            execution_timeout: Duration::from_secs(config.worker.execution_timeout_seconds),
            response_ttl: Duration::from_secs(config.queue.response_ttl_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Executing,
    CommittingChanges,
    Publishing,
    Draining,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Executing => "executing",
            WorkerState::CommittingChanges => "committing",
            WorkerState::Publishing => "publishing",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What one dequeued entry led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The tool succeeded and a `response` was published.
    Completed { task_id: String },
    /// The tool failed and an `error` was published.
    Failed { task_id: String, reason: String },
    /// The entry was not a task; nothing to answer.
    Skipped { reason: String },
    /// The reply could not be written to the store.
    PublishFailed { task_id: String, reason: String },
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub publish_failed: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &IterationOutcome) {
        match outcome {
            IterationOutcome::Completed { .. } => self.completed += 1,
            IterationOutcome::Failed { .. } => self.failed += 1,
            IterationOutcome::Skipped { .. } => self.skipped += 1,
            IterationOutcome::PublishFailed { .. } => self.publish_failed += 1,
        }
    }
}

pub struct Worker<'a> {
    agent: &'a AgentDescriptor,
    store: &'a dyn QueueStore,
    workspace: Workspace,
    push_target: PushTarget,
    options: WorkerOptions,
    shutdown: ShutdownSignal,
    state: WorkerState,
    stats: WorkerStats,
}

impl<'a> Worker<'a> {
    pub fn new(
        agent: &'a AgentDescriptor,
        config: &PoolConfig,
        store: &'a dyn QueueStore,
        workspace: Workspace,
        shutdown: ShutdownSignal,
    ) -> Self {
        let push_target = PushTarget::from_settings(&config.git, &workspace.path, |key| {
            std::env::var(key).ok()
        });
        Self {
            agent,
            store,
            workspace,
            push_target,
            options: WorkerOptions::from_config(config),
            shutdown,
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Consume the agent's queue until shutdown is requested.
    ///
    /// A failing pop ends the loop with the error; everything that happens
    /// to an individual task is handled inside the iteration.
    pub fn run(&mut self) -> Result<WorkerStats> {
        info!(
            agent = %self.agent.name,
            role = %self.agent.role,
            workspace = %self.workspace.path.display(),
            push_target = %self.push_target,
            "worker started"
        );

        while !self.shutdown.is_requested() {
            if let Err(e) = self.poll_once() {
                error!(agent = %self.agent.name, error = %e, "queue store unavailable, stopping");
                self.transition(WorkerState::Stopped);
                return Err(e);
            }
        }

        self.transition(WorkerState::Draining);
        self.transition(WorkerState::Stopped);
        info!(
            agent = %self.agent.name,
            completed = self.stats.completed,
            failed = self.stats.failed,
            "worker stopped"
        );
        Ok(self.stats)
    }

    /// Wait up to the poll timeout for one entry and handle it.
    ///
    /// `Ok(None)` means the wait timed out.
    pub fn poll_once(&mut self) -> Result<Option<IterationOutcome>> {
        let key = self.agent.queue_key();
        let Some(payload) = self.store.blocking_pop(&key, self.options.poll_timeout)? else {
            return Ok(None);
        };

        let outcome = self.handle_payload(&payload);
        self.stats.record(&outcome);
        self.transition(WorkerState::Idle);
        Ok(Some(outcome))
    }

    fn handle_payload(&mut self, payload: &str) -> IterationOutcome {
        let task = match TaskMessage::from_json(payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(agent = %self.agent.name, error = %e, "skipping undecodable queue entry");
                return IterationOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };
        if task.kind != MessageType::Task {
            warn!(agent = %self.agent.name, id = %task.id, kind = %task.kind, "skipping non-task message");
            return IterationOutcome::Skipped {
                reason: format!("message {} is a {}, not a task", task.id, task.kind),
            };
        }

        self.run_task(&task)
    }

    fn run_task(&mut self, task: &TaskMessage) -> IterationOutcome {
        info!(agent = %self.agent.name, task_id = %task.id, from = %task.from, "task received");

        self.transition(WorkerState::Executing);
        let execution = self.execute(task);

        let persisted = if self.agent.role.owns_workspace() {
            self.transition(WorkerState::CommittingChanges);
            Some(self.persist(task))
        } else {
            debug!(agent = %self.agent.name, role = %self.agent.role, "role does not commit, skipping");
            None
        };

        self.transition(WorkerState::Publishing);
        let reply = self.build_reply(task, &execution, persisted.as_ref());
        let succeeded = reply.kind == MessageType::Response;

        if let Err(e) = self.publish(&reply, &task.id) {
            error!(agent = %self.agent.name, task_id = %task.id, error = %e, "failed to publish reply");
            return IterationOutcome::PublishFailed {
                task_id: task.id.clone(),
                reason: e.to_string(),
            };
        }

        match execution {
            Ok(result) if succeeded => {
                info!(
                    agent = %self.agent.name,
                    task_id = %task.id,
                    duration_ms = result.duration.as_millis() as u64,
                    "task completed"
                );
                IterationOutcome::Completed {
                    task_id: task.id.clone(),
                }
            }
            other => {
                let reason = match other {
                    Ok(result) => result.failure_reason(self.options.execution_timeout),
                    Err(e) => e.to_string(),
                };
                error!(agent = %self.agent.name, task_id = %task.id, reason = %reason, "task failed");
                IterationOutcome::Failed {
                    task_id: task.id.clone(),
                    reason,
                }
            }
        }
    }

    fn execute(&self, task: &TaskMessage) -> Result<ExecutionResult> {
        let working_dir = resolve_working_dir(&self.workspace.path, task.project_path())?;
        let auto_approve = task.auto_approve();
        let instruction = build_instruction(&task.content, auto_approve);
        execute(
            self.agent,
            &instruction,
            auto_approve,
            &working_dir,
            self.options.execution_timeout,
        )
    }

    /// Commit even after a failed run so partial work stays on the branch.
    fn persist(&self, task: &TaskMessage) -> std::result::Result<PersistOutcome, String> {
        let message = format!("{}: task {}", self.agent.name, task.id);
        match persist_changes(&self.workspace.path, &message, &self.push_target) {
            Ok(outcome) => {
                if let Some(warning) = outcome.warning() {
                    warn!(agent = %self.agent.name, task_id = %task.id, "{}", warning);
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(agent = %self.agent.name, task_id = %task.id, error = %e, "failed to persist changes");
                Err(e.to_string())
            }
        }
    }

    fn build_reply(
        &self,
        task: &TaskMessage,
        execution: &Result<ExecutionResult>,
        persisted: Option<&std::result::Result<PersistOutcome, String>>,
    ) -> TaskMessage {
        let mut reply = match execution {
            Ok(result) if result.is_success() => {
                TaskMessage::response_to(task, &self.agent.name, result.output())
            }
            Ok(result) => {
                let reason = result.failure_reason(self.options.execution_timeout);
                let content = match result.output() {
                    "" => format!("Task failed: {}", reason),
                    output => format!("Task failed: {}\n\n{}", reason, output),
                };
                TaskMessage::error_to(task, &self.agent.name, &content)
            }
            Err(e) => TaskMessage::error_to(task, &self.agent.name, &format!("Task failed: {}", e)),
        };

        if let Ok(result) = execution {
            if let Some(code) = result.exit_code {
                reply = reply.with_metadata(META_EXIT_CODE, code);
            }
            reply = reply
                .with_metadata(META_DURATION_MS, result.duration.as_millis() as u64)
                .with_metadata(META_TIMED_OUT, result.timed_out);
        }

        match persisted {
            Some(Ok(outcome)) => {
                if let Some(branch) = outcome.branch.as_deref() {
                    reply = reply.with_metadata(META_BRANCH, branch);
                }
                if let Some(commit) = outcome.commit.as_deref() {
                    reply = reply.with_metadata(META_COMMIT, commit);
                }
                reply = reply.with_metadata(META_PUSHED, outcome.pushed());
                if let Some(warning) = outcome.warning() {
                    reply = reply.with_metadata(META_PERSIST_WARNING, warning);
                }
            }
            Some(Err(reason)) => {
                reply = reply
                    .with_metadata(META_PUSHED, false)
                    .with_metadata(META_PERSIST_WARNING, reason.as_str());
            }
            None => {}
        }

        reply
    }

    fn publish(&self, reply: &TaskMessage, task_id: &str) -> Result<()> {
        let key = response_queue_key(task_id);
        self.store.push(&key, &reply.to_json()?)?;
        if let Err(e) = self.store.expire(&key, self.options.response_ttl) {
            warn!(key = %key, error = %e, "failed to set reply expiry");
        }
        debug!(task_id, kind = %reply.kind, "reply published");
        Ok(())
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(agent = %self.agent.name, from = %self.state, to = %next, "worker state");
            self.state = next;
        }
    }
}
