//! Implementation of the `crew workspace` commands.

use super::Session;
use crate::cli::{WorkspaceCreateArgs, WorkspaceRemoveArgs};
use crate::error::{CrewError, Result};
use crate::workspace::{self, CreateOutcome, has_changes, unpushed_commits};
use std::path::PathBuf;

pub fn cmd_create(config_path: Option<PathBuf>, args: WorkspaceCreateArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let agent = session.config.require_agent(&args.agent)?;

    let branch = match args.branch.or_else(|| agent.workspace_branch()) {
        Some(branch) => branch,
        None => {
            return Err(CrewError::UserError(format!(
                "agent '{}' is a {} and works in the main checkout.\n\n\
                 Pass --branch to create a workspace for it anyway.",
                agent.name, agent.role
            )));
        }
    };

    match workspace::create(&session.ctx, &agent.name, &branch)? {
        CreateOutcome::Created(ws) => {
            println!("Created workspace {} on {}", ws.path.display(), branch)
        }
        CreateOutcome::AlreadyExists(ws) => {
            println!("Workspace {} already exists on {}", ws.path.display(), branch)
        }
    }
    Ok(())
}

pub fn cmd_list(config_path: Option<PathBuf>) -> Result<()> {
    let session = Session::load(config_path)?;
    let workspaces = workspace::list(&session.ctx)?;

    if workspaces.is_empty() {
        println!("No workspaces under {}", session.ctx.worktrees_dir.display());
        return Ok(());
    }

    println!("{:<20} {:<32} {:<8} PATH", "AGENT", "BRANCH", "STATE");
    for ws in workspaces {
        let state = match (has_changes(&ws.path), unpushed_commits(&ws.path)) {
            (Ok(true), _) => "dirty".to_string(),
            (Ok(false), Ok(0)) => "clean".to_string(),
            (Ok(false), Ok(n)) => format!("+{}", n),
            _ => "?".to_string(),
        };
        println!(
            "{:<20} {:<32} {:<8} {}",
            ws.agent_name,
            ws.branch.as_deref().unwrap_or("(detached)"),
            state,
            ws.path.display()
        );
    }
    Ok(())
}

pub fn cmd_remove(config_path: Option<PathBuf>, args: WorkspaceRemoveArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    workspace::remove(&session.ctx, &args.path, args.force)?;
    println!("Removed workspace {}", args.path.display());
    Ok(())
}

pub fn cmd_prune(config_path: Option<PathBuf>) -> Result<()> {
    let session = Session::load(config_path)?;
    let report = workspace::prune(&session.ctx)?;

    if report.removed.is_empty()
        && report.skipped_dirty.is_empty()
        && report.skipped_detached.is_empty()
    {
        println!("Nothing to prune");
        return Ok(());
    }
    for ws in &report.removed {
        println!("Pruned {}", ws.path.display());
    }
    for ws in &report.skipped_dirty {
        println!("Kept {} (unsaved edits)", ws.path.display());
    }
    for ws in &report.skipped_detached {
        println!("Kept {} (detached HEAD)", ws.path.display());
    }
    Ok(())
}
