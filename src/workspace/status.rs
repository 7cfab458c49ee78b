//! Status queries on a workspace.

use super::SHARED_EXCLUDE;
use crate::error::Result;
use crate::git::run_git;
use std::path::Path;

/// Branch checked out in `worktree_path`, or `None` when HEAD is detached.
pub fn current_branch<P: AsRef<Path>>(worktree_path: P) -> Result<Option<String>> {
    match run_git(&worktree_path, &["symbolic-ref", "--quiet", "--short", "HEAD"]) {
        Ok(output) => Ok(Some(output.stdout)),
        Err(_) => {
            // Distinguish "detached" from "not a repository".
            run_git(&worktree_path, &["rev-parse", "--git-dir"])?;
            Ok(None)
        }
    }
}

/// True when the workspace has tracked or untracked changes outside the
/// shared metadata tree.
pub fn has_changes<P: AsRef<Path>>(worktree_path: P) -> Result<bool> {
    let output = run_git(
        worktree_path,
        &["status", "--porcelain", "--", ".", SHARED_EXCLUDE],
    )?;
    Ok(!output.is_empty())
}

/// Number of commits on HEAD that would be lost with the workspace.
///
/// With an upstream configured this counts commits not on the upstream.
/// Otherwise it counts commits not reachable from any other local branch or
/// any remote-tracking branch.
pub fn unpushed_commits<P: AsRef<Path>>(worktree_path: P) -> Result<usize> {
    let worktree_path = worktree_path.as_ref();

    let range = if run_git(
        worktree_path,
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"],
    )
    .is_ok()
    {
        run_git(worktree_path, &["rev-list", "--count", "@{upstream}..HEAD"])?
    } else {
        let exclude = current_branch(worktree_path)?
            .map(|branch| format!("--exclude=refs/heads/{}", branch));
        let mut args = vec!["rev-list", "--count", "HEAD", "--not"];
        if let Some(exclude) = exclude.as_deref() {
            args.push(exclude);
        }
        args.extend(["--branches", "--remotes"]);
        run_git(worktree_path, &args)?
    };

    Ok(range.stdout.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_repo, create_test_repo_with_origin, git};

    #[test]
    fn test_current_branch() {
        let temp_dir = create_test_repo();
        assert_eq!(current_branch(temp_dir.path()).unwrap().as_deref(), Some("main"));

        git(temp_dir.path(), &["checkout", "--detach"]);
        assert_eq!(current_branch(temp_dir.path()).unwrap(), None);
    }

    #[test]
    fn test_has_changes_sees_untracked_and_ignores_shared_tree() {
        let temp_dir = create_test_repo();
        let path = temp_dir.path();
        assert!(!has_changes(path).unwrap());

        std::fs::write(path.join(".crew").join("plan.md"), "# Edited\n").unwrap();
        assert!(!has_changes(path).unwrap());

        std::fs::write(path.join("new.txt"), "x").unwrap();
        assert!(has_changes(path).unwrap());
    }

    #[test]
    fn test_unpushed_without_upstream() {
        let temp_dir = create_test_repo();
        let path = temp_dir.path();
        git(path, &["checkout", "-b", "executor/executor-1"]);
        assert_eq!(unpushed_commits(path).unwrap(), 0);

        std::fs::write(path.join("work.txt"), "x").unwrap();
        git(path, &["add", "work.txt"]);
        git(path, &["commit", "-m", "work"]);
        assert_eq!(unpushed_commits(path).unwrap(), 1);
    }

    #[test]
    fn test_unpushed_with_upstream() {
        let repo = create_test_repo_with_origin();
        let path = repo.path();
        git(path, &["branch", "--set-upstream-to=origin/main"]);
        assert_eq!(unpushed_commits(path).unwrap(), 0);

        std::fs::write(path.join("work.txt"), "x").unwrap();
        git(path, &["add", "work.txt"]);
        git(path, &["commit", "-m", "work"]);
        assert_eq!(unpushed_commits(path).unwrap(), 1);

        git(path, &["push", "origin", "main"]);
        assert_eq!(unpushed_commits(path).unwrap(), 0);
    }
}
