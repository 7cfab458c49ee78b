//! Branch existence and creation.

use crate::error::{CrewError, Result};
use crate::git::run_git;
use std::path::Path;

/// Check if a branch exists locally.
pub fn branch_exists<P: AsRef<Path>>(repo_root: P, branch: &str) -> Result<bool> {
    let output = run_git(
        repo_root,
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)],
    );
    Ok(output.is_ok())
}

/// Create `branch` at `start_point` (a SHA or any revision).
pub fn create_branch<P: AsRef<Path>>(repo_root: P, branch: &str, start_point: &str) -> Result<()> {
    run_git(repo_root, &["branch", branch, start_point]).map_err(|e| {
        CrewError::GitError(format!(
            "failed to create branch '{}' at {}: {}",
            branch, start_point, e
        ))
    })?;
    Ok(())
}
