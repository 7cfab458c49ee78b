//! Command implementations for crew.
//!
//! Each handler loads the repository context and the pool configuration,
//! builds the components it needs, and prints a human summary on stdout.

mod agents;
mod dispatch;
mod pool;
mod queue;
mod worker;
mod workspace;

use crate::cli::{Cli, Command, QueueAction, WorkspaceAction};
use crate::config::PoolConfig;
use crate::context::ProjectContext;
use crate::error::Result;
use crate::queue::RedisQueueStore;
use std::path::PathBuf;
use tracing::debug;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = cli.config;
    match cli.command {
        Command::Up(args) => pool::cmd_up(config, args),
        Command::Down(args) => pool::cmd_down(config, args),
        Command::Worker(args) => worker::cmd_worker(config, args),
        Command::Dispatch(args) => dispatch::cmd_dispatch(config, args),
        Command::Queue(queue_cmd) => match queue_cmd.action {
            QueueAction::Status => queue::cmd_status(config),
            QueueAction::Peek(args) => queue::cmd_peek(config, args),
            QueueAction::Clear(args) => queue::cmd_clear(config, args),
        },
        Command::Workspace(workspace_cmd) => match workspace_cmd.action {
            WorkspaceAction::Create(args) => workspace::cmd_create(config, args),
            WorkspaceAction::List => workspace::cmd_list(config),
            WorkspaceAction::Remove(args) => workspace::cmd_remove(config, args),
            WorkspaceAction::Prune => workspace::cmd_prune(config),
        },
        Command::Agents => agents::cmd_agents(config),
    }
}

/// Repository context plus the validated pool configuration.
struct Session {
    ctx: ProjectContext,
    config: PoolConfig,
}

impl Session {
    fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let ctx = ProjectContext::resolve()?.with_config_path(config_path);
        let config =
            PoolConfig::load(&ctx.config_path)?.with_env_overrides(|key| std::env::var(key).ok());
        debug!(
            repo = %ctx.repo_root.display(),
            config = %ctx.config_path.display(),
            agents = config.agents.len(),
            "session loaded"
        );
        Ok(Self { ctx, config })
    }

    fn connect_queue(&self) -> Result<RedisQueueStore> {
        RedisQueueStore::connect(&self.config.queue.url)
    }
}
