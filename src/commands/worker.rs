//! Implementation of the `crew worker` command.

use super::Session;
use crate::cli::WorkerArgs;
use crate::error::{CrewError, Result};
use crate::worker::{ShutdownSignal, WORKSPACE_ENV, Worker};
use crate::workspace::{self, Workspace, current_branch};
use std::path::PathBuf;

/// Run the worker loop for one agent until SIGINT/SIGTERM.
///
/// The workspace comes from `CREW_WORKSPACE` when set (inside the agent's
/// container), otherwise it is ensured under `.worktrees/`.
pub fn cmd_worker(config_path: Option<PathBuf>, args: WorkerArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let agent = session.config.require_agent(&args.agent)?;

    let workspace = match std::env::var_os(WORKSPACE_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.is_dir() {
                return Err(CrewError::UserError(format!(
                    "{} points at '{}', which is not a directory",
                    WORKSPACE_ENV,
                    path.display()
                )));
            }
            Workspace {
                agent_name: agent.name.clone(),
                branch: current_branch(&path)?,
                path,
            }
        }
        None => workspace::ensure(&session.ctx, agent)?,
    };

    let store = session.connect_queue()?;
    let shutdown = ShutdownSignal::install()?;

    let mut worker = Worker::new(agent, &session.config, &store, workspace, shutdown);
    let stats = worker.run()?;

    println!(
        "Worker {} stopped: {} completed, {} failed, {} skipped, {} unpublished",
        agent.name, stats.completed, stats.failed, stats.skipped, stats.publish_failed
    );
    Ok(())
}
