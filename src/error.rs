//! Error types for agentcrew.
//!
//! Uses thiserror for derive macros. Variants follow the failure classes the
//! CLI has to tell apart: a misconfigured target, an unreachable store, a
//! failed git or container command, and a failed tool run.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for agentcrew operations.
#[derive(Error, Debug)]
pub enum CrewError {
    /// User provided invalid arguments or the local state is invalid.
    #[error("{0}")]
    UserError(String),

    /// The agent pool configuration is missing, malformed or inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An operation named an agent that is not in the pool configuration.
    #[error("unknown agent '{name}' (configured agents: {available})")]
    UnknownAgent { name: String, available: String },

    /// The queue store or container engine could not be reached.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The queue store was reachable but rejected a command.
    #[error("queue operation failed: {0}")]
    QueueError(String),

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    GitError(String),

    /// A container engine command failed.
    #[error("container runtime error: {0}")]
    RuntimeError(String),

    /// The agent's command-line tool could not be run, failed or timed out.
    #[error("execution failed: {0}")]
    ExecutionError(String),

    /// A queue payload could not be decoded or broke correlation rules.
    #[error("invalid message: {0}")]
    MessageError(String),

    /// No reply arrived in time. The task itself is still queued or running.
    #[error("no response to task {task_id} within {waited_secs}s; the task stays queued")]
    ResponseTimeout { task_id: String, waited_secs: u64 },
}

impl CrewError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CrewError::UserError(_) => exit_codes::USER_ERROR,
            CrewError::ConfigError(_) | CrewError::UnknownAgent { .. } => exit_codes::CONFIG_ERROR,
            CrewError::Connectivity(_) | CrewError::QueueError(_) => exit_codes::QUEUE_FAILURE,
            CrewError::MessageError(_) => exit_codes::QUEUE_FAILURE,
            CrewError::GitError(_) => exit_codes::GIT_FAILURE,
            CrewError::RuntimeError(_) => exit_codes::RUNTIME_FAILURE,
            CrewError::ExecutionError(_) => exit_codes::EXECUTION_FAILURE,
            CrewError::ResponseTimeout { .. } => exit_codes::RESPONSE_TIMEOUT,
        }
    }

    /// True for the errors the caller should read as "target misconfigured".
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CrewError::ConfigError(_) | CrewError::UnknownAgent { .. }
        )
    }
}

/// Result type alias for agentcrew operations.
pub type Result<T> = std::result::Result<T, CrewError>;
