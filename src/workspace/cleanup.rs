//! Removing and pruning workspaces.

use super::branch::branch_exists;
use super::status::{has_changes, unpushed_commits};
use super::worktree::{list, list_worktrees, paths_equivalent};
use super::{SHARED_EXCLUDE, Workspace};
use crate::context::ProjectContext;
use crate::error::{CrewError, Result};
use crate::git::run_git;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// What [`prune`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Workspaces removed because their branch no longer resolves.
    pub removed: Vec<Workspace>,
    /// Orphaned workspaces kept because they hold unsaved edits.
    pub skipped_dirty: Vec<Workspace>,
    /// Workspaces on a detached HEAD, never pruned.
    pub skipped_detached: Vec<Workspace>,
}

/// Remove the workspace at `path`.
///
/// Without `force`, a workspace with uncommitted changes or with commits that
/// exist nowhere else is refused. The branch itself is kept.
pub fn remove(ctx: &ProjectContext, path: &Path, force: bool) -> Result<()> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.repo_root.join(path)
    };

    let worktrees = list_worktrees(&ctx.repo_root)?;
    let Some(position) = worktrees
        .iter()
        .position(|wt| paths_equivalent(&wt.path, &path))
    else {
        return Err(CrewError::UserError(format!(
            "'{}' is not a worktree of this repository.\n\n\
             Run `crew workspace list` to see the existing workspaces.",
            path.display()
        )));
    };
    if position == 0 {
        return Err(CrewError::UserError(
            "refusing to remove the main checkout".to_string(),
        ));
    }

    if !force && path.exists() {
        if has_changes(&path)? {
            return Err(CrewError::UserError(format!(
                "workspace '{}' has uncommitted changes.\n\n\
                 Commit or discard them, or pass --force to remove it anyway.",
                path.display()
            )));
        }
        let unpushed = unpushed_commits(&path)?;
        if unpushed > 0 {
            return Err(CrewError::UserError(format!(
                "workspace '{}' has {} commit(s) that are not pushed.\n\n\
                 Push the branch first, or pass --force to remove it anyway.",
                path.display(),
                unpushed
            )));
        }
    }

    remove_worktree(&ctx.repo_root, &path, force)?;
    info!(path = %path.display(), force, "workspace removed");
    Ok(())
}

/// Clear stale worktree records, then remove workspaces whose branch is gone.
///
/// Workspaces on a valid branch are never touched. A detached HEAD has no
/// branch to check, so those workspaces are reported and kept.
pub fn prune(ctx: &ProjectContext) -> Result<PruneReport> {
    run_git(&ctx.repo_root, &["worktree", "prune"])?;

    let mut report = PruneReport::default();
    for workspace in list(ctx)? {
        let Some(branch) = workspace.branch.as_deref() else {
            debug!(agent = %workspace.agent_name, "workspace on a detached HEAD, not pruning");
            report.skipped_detached.push(workspace);
            continue;
        };
        if branch_exists(&ctx.repo_root, branch)? {
            continue;
        }

        if has_unsaved_edits(&workspace.path)? {
            warn!(
                agent = %workspace.agent_name,
                path = %workspace.path.display(),
                "orphaned workspace has unsaved edits, leaving it in place"
            );
            report.skipped_dirty.push(workspace);
            continue;
        }

        remove_worktree(&ctx.repo_root, &workspace.path, true)?;
        info!(agent = %workspace.agent_name, "pruned orphaned workspace");
        report.removed.push(workspace);
    }

    Ok(report)
}

/// Anything that would be lost with an orphaned workspace: working tree
/// edits, untracked files, staged changes, or commits no branch or
/// remote-tracking ref reaches.
///
/// An orphaned workspace's HEAD names a deleted branch, so the commit it last
/// pointed at is read from the worktree's HEAD reflog. Without one, the
/// workspace counts as unsaved.
fn has_unsaved_edits(path: &Path) -> Result<bool> {
    let modified = run_git(path, &["diff", "--name-only", "--", ".", SHARED_EXCLUDE])?;
    if !modified.is_empty() {
        return Ok(true);
    }
    let untracked = run_git(
        path,
        &["ls-files", "--others", "--exclude-standard", "--", ".", SHARED_EXCLUDE],
    )?;
    if !untracked.is_empty() {
        return Ok(true);
    }

    let Some(last_head) = last_head_commit(path)? else {
        return Ok(true);
    };
    let staged = run_git(
        path,
        &["diff", "--cached", "--name-only", &last_head, "--", ".", SHARED_EXCLUDE],
    )?;
    if !staged.is_empty() {
        return Ok(true);
    }
    let unreachable = run_git(
        path,
        &["rev-list", "--count", &last_head, "--not", "--branches", "--remotes"],
    )?;
    Ok(unreachable.stdout.parse::<usize>().map_or(true, |n| n > 0))
}

/// Commit HEAD last moved to, from the worktree's own HEAD reflog.
fn last_head_commit(path: &Path) -> Result<Option<String>> {
    let git_dir = run_git(path, &["rev-parse", "--absolute-git-dir"])?;
    let reflog = match fs::read_to_string(Path::new(&git_dir.stdout).join("logs").join("HEAD")) {
        Ok(reflog) => reflog,
        Err(_) => return Ok(None),
    };
    Ok(reflog
        .lines()
        .last()
        .and_then(|entry| entry.split_whitespace().nth(1))
        .map(str::to_string))
}

fn remove_worktree(repo_root: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    let worktree_str = worktree_path.to_string_lossy();

    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(&worktree_str);

    match run_git(repo_root, &args) {
        Ok(_) => Ok(()),
        Err(e) if force => {
            // git refuses some broken worktrees even with --force.
            warn!(path = %worktree_str, error = %e, "git worktree remove failed, deleting directory");
            delete_dir(worktree_path)?;
            run_git(repo_root, &["worktree", "prune"])?;
            Ok(())
        }
        Err(e) => Err(CrewError::GitError(format!(
            "failed to remove worktree '{}': {}",
            worktree_str, e
        ))),
    }
}

fn delete_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir_all(path).map_err(|e| {
        CrewError::GitError(format!("failed to delete '{}': {}", path.display(), e))
    })
}
