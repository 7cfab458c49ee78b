//! CLI argument parsing for crew.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// crew: task dispatch and isolated workspaces for a pool of AI coding agents.
///
/// A planner, executors and an optional tester each consume their own queue
/// in a shared queue store. Executors work in private git worktrees and push
/// their branches after every task.
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Agent pool configuration (default: .crew/agents.yaml, or $CREW_CONFIG).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for crew.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision the network, the queue store and one container per agent.
    ///
    /// Running containers are left untouched, so `up` can be repeated.
    Up(UpArgs),

    /// Remove every agent container.
    Down(DownArgs),

    /// Run an agent's worker loop until interrupted.
    ///
    /// Normally started inside the agent's container by `up`.
    Worker(WorkerArgs),

    /// Send a task to an agent.
    Dispatch(DispatchArgs),

    /// Inspect or clear agent queues.
    Queue(QueueCommand),

    /// Manage executor workspaces.
    Workspace(WorkspaceCommand),

    /// List configured agents.
    Agents,
}

/// Arguments for the `up` command.
#[derive(Parser, Debug)]
pub struct UpArgs {
    /// Do not start a queue store container.
    #[arg(long)]
    pub no_queue: bool,
}

/// Arguments for the `down` command.
#[derive(Parser, Debug)]
pub struct DownArgs {
    /// Also remove the queue store container.
    #[arg(long)]
    pub with_queue: bool,
}

/// Arguments for the `worker` command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Agent whose queue to consume.
    pub agent: String,
}

/// Arguments for the `dispatch` command.
#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// Target agent.
    pub agent: String,

    /// Task instruction.
    pub content: String,

    /// Block until the agent replies.
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait for the reply (default: queue.dispatch_timeout_seconds).
    #[arg(long, requires = "wait")]
    pub timeout: Option<u64>,

    /// Sender name recorded in the task (default: operator@<hostname>).
    #[arg(long)]
    pub from: Option<String>,

    /// Ask the agent to work without confirmation prompts.
    #[arg(long)]
    pub auto_approve: bool,

    /// Directory inside the agent's workspace to run in.
    #[arg(long, value_name = "PATH")]
    pub project_path: Option<String>,
}

/// Queue subcommands.
#[derive(Parser, Debug)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub action: QueueAction,
}

/// Available queue actions.
#[derive(Subcommand, Debug)]
pub enum QueueAction {
    /// Pending task count per agent.
    Status,

    /// Show pending tasks without consuming them.
    Peek(QueuePeekArgs),

    /// Discard pending tasks for one agent, or `*` for all.
    Clear(QueueClearArgs),
}

/// Arguments for the `queue peek` command.
#[derive(Parser, Debug)]
pub struct QueuePeekArgs {
    pub agent: String,

    /// Number of tasks to show.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,
}

/// Arguments for the `queue clear` command.
#[derive(Parser, Debug)]
pub struct QueueClearArgs {
    /// Agent name, or `*` for every configured agent.
    pub target: String,
}

/// Workspace subcommands.
#[derive(Parser, Debug)]
pub struct WorkspaceCommand {
    #[command(subcommand)]
    pub action: WorkspaceAction,
}

/// Available workspace actions.
#[derive(Subcommand, Debug)]
pub enum WorkspaceAction {
    /// Create a workspace for an agent.
    Create(WorkspaceCreateArgs),

    /// List workspaces under .worktrees/.
    List,

    /// Remove a workspace.
    ///
    /// Refuses workspaces with uncommitted or unpushed work unless --force.
    Remove(WorkspaceRemoveArgs),

    /// Remove workspaces whose branch is gone.
    Prune,
}

/// Arguments for the `workspace create` command.
#[derive(Parser, Debug)]
pub struct WorkspaceCreateArgs {
    pub agent: String,

    /// Branch to check out (default: the agent's configured branch).
    #[arg(long)]
    pub branch: Option<String>,
}

/// Arguments for the `workspace remove` command.
#[derive(Parser, Debug)]
pub struct WorkspaceRemoveArgs {
    /// Workspace path, absolute or relative to the repository root.
    pub path: PathBuf,

    /// Remove even with uncommitted or unpushed work.
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
