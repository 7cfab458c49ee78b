//! Worktree creation, listing, and create-or-reuse.

use super::Workspace;
use super::branch::{branch_exists, create_branch};
use super::status::current_branch;
use crate::agent::AgentDescriptor;
use crate::context::{ProjectContext, WORKTREES_DIR};
use crate::error::{CrewError, Result};
use crate::git::{get_common_dir, run_git};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of [`create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Workspace),
    /// The same agent/branch pair already had its workspace.
    AlreadyExists(Workspace),
}

impl CreateOutcome {
    pub fn workspace(&self) -> &Workspace {
        match self {
            CreateOutcome::Created(ws) | CreateOutcome::AlreadyExists(ws) => ws,
        }
    }

    pub fn into_workspace(self) -> Workspace {
        match self {
            CreateOutcome::Created(ws) | CreateOutcome::AlreadyExists(ws) => ws,
        }
    }
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone)]
pub(crate) struct ExistingWorktree {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// All worktrees of the repository, main checkout first.
pub(crate) fn list_worktrees<P: AsRef<Path>>(repo_root: P) -> Result<Vec<ExistingWorktree>> {
    let output = run_git(repo_root, &["worktree", "list", "--porcelain"])?;

    let mut worktrees = Vec::new();
    let mut current: Option<ExistingWorktree> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            worktrees.extend(current.take());
            current = Some(ExistingWorktree {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch_ref) = line.strip_prefix("branch ")
            && let Some(wt) = current.as_mut()
        {
            wt.branch = branch_ref.strip_prefix("refs/heads/").map(String::from);
        }
    }
    worktrees.extend(current);

    Ok(worktrees)
}

/// Agent workspaces under `.worktrees/`.
pub fn list(ctx: &ProjectContext) -> Result<Vec<Workspace>> {
    let root = canonical(&ctx.worktrees_dir);

    Ok(list_worktrees(&ctx.repo_root)?
        .into_iter()
        .filter_map(|wt| {
            let path = canonical(&wt.path);
            let agent_name = path
                .strip_prefix(&root)
                .ok()?
                .to_str()
                .filter(|name| !name.is_empty() && !name.contains('/'))?
                .to_string();
            Some(Workspace {
                agent_name,
                path,
                branch: wt.branch,
            })
        })
        .collect())
}

/// Create the workspace for `agent_name` on `branch`.
///
/// The branch is created from the main checkout's HEAD when missing. A branch
/// may back only one live worktree, and the path may hold only this agent's
/// worktree; anything else is refused rather than repaired.
pub fn create(ctx: &ProjectContext, agent_name: &str, branch: &str) -> Result<CreateOutcome> {
    let path = ctx.workspace_path(agent_name);
    let worktrees = list_worktrees(&ctx.repo_root)?;

    if let Some(existing) = worktrees
        .iter()
        .find(|wt| wt.branch.as_deref() == Some(branch))
    {
        if paths_equivalent(&existing.path, &path) {
            debug!(agent = agent_name, branch, "workspace already exists");
            return Ok(CreateOutcome::AlreadyExists(Workspace {
                agent_name: agent_name.to_string(),
                path: canonical(&existing.path),
                branch: Some(branch.to_string()),
            }));
        }
        return Err(CrewError::UserError(format!(
            "branch '{}' is already checked out at '{}'.\n\n\
             A branch can back only one workspace. Remove that worktree first or \
             choose another branch.",
            branch,
            existing.path.display()
        )));
    }

    if let Some(occupant) = worktrees
        .iter()
        .find(|wt| paths_equivalent(&wt.path, &path))
    {
        return Err(CrewError::UserError(format!(
            "workspace '{}' is already checked out on branch '{}', not '{}'.\n\n\
             Remove it with `crew workspace remove {}` and try again.",
            path.display(),
            occupant.branch.as_deref().unwrap_or("(detached)"),
            branch,
            path.display()
        )));
    }

    if path.exists() {
        return Err(CrewError::UserError(format!(
            "path '{}' already exists but is not a worktree.\n\n\
             Remove the directory manually and try again:\n\
             rm -rf {}",
            path.display(),
            path.display()
        )));
    }

    if !branch_exists(&ctx.repo_root, branch)? {
        create_branch(&ctx.repo_root, branch, "HEAD")?;
    }

    fs::create_dir_all(&ctx.worktrees_dir).map_err(|e| {
        CrewError::GitError(format!(
            "failed to create worktrees directory '{}': {}",
            ctx.worktrees_dir.display(),
            e
        ))
    })?;
    exclude_worktrees_dir(&ctx.repo_root)?;

    let path_str = path.to_string_lossy();
    run_git(&ctx.repo_root, &["worktree", "add", &path_str, branch]).map_err(|e| {
        CrewError::GitError(format!(
            "failed to create worktree at '{}' for branch '{}': {}",
            path_str, branch, e
        ))
    })?;
    info!(agent = agent_name, branch, path = %path.display(), "workspace created");

    Ok(CreateOutcome::Created(Workspace {
        agent_name: agent_name.to_string(),
        path: canonical(&path),
        branch: Some(branch.to_string()),
    }))
}

/// Workspace for `agent`, creating it if needed.
///
/// Executors get their private worktree; other roles get the main checkout.
pub fn ensure(ctx: &ProjectContext, agent: &AgentDescriptor) -> Result<Workspace> {
    match agent.workspace_branch() {
        Some(branch) => Ok(create(ctx, &agent.name, &branch)?.into_workspace()),
        None => Ok(Workspace {
            agent_name: agent.name.clone(),
            path: ctx.repo_root.clone(),
            branch: current_branch(&ctx.repo_root)?,
        }),
    }
}

/// Keep `.worktrees/` out of the main checkout's status.
fn exclude_worktrees_dir(repo_root: &Path) -> Result<()> {
    let entry = format!("/{}/", WORKTREES_DIR);
    let exclude_path = get_common_dir(repo_root)?.join("info").join("exclude");

    let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry);
    content.push('\n');

    if let Some(parent) = exclude_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CrewError::GitError(format!("failed to create '{}': {}", parent.display(), e))
        })?;
    }
    fs::write(&exclude_path, content).map_err(|e| {
        CrewError::GitError(format!(
            "failed to update '{}': {}",
            exclude_path.display(),
            e
        ))
    })
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

pub(crate) fn paths_equivalent(a: &Path, b: &Path) -> bool {
    canonical(a) == canonical(b)
}
