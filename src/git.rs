//! Git command runner.
//!
//! Every git invocation in the crate goes through [`run_git`], which captures
//! stdout/stderr and turns a non-zero exit into a [`CrewError::GitError`]
//! carrying git's own message.

use crate::error::{CrewError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Captured output of a successful git command.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output (trimmed).
    pub stdout: String,
    /// Standard error (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Returns true if stdout is empty.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
    }

    /// Returns stdout lines as a vector.
    pub fn lines(&self) -> Vec<&str> {
        if self.stdout.is_empty() {
            Vec::new()
        } else {
            self.stdout.lines().collect()
        }
    }
}

/// Run a git command in `cwd`.
///
/// # Returns
///
/// * `Ok(GitOutput)` - On exit code 0
/// * `Err(CrewError::GitError)` - On spawn failure or non-zero exit
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| {
            CrewError::GitError(format!(
                "failed to execute git {}: {}",
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if git_output.stderr.is_empty() {
            git_output.stdout.clone()
        } else {
            git_output.stderr.clone()
        };

        Err(CrewError::GitError(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

/// Get the toplevel of the checkout containing `cwd`.
///
/// "Not a git repository" is reported as a [`CrewError::UserError`] because
/// the fix is to run the command somewhere else, not to repair git.
pub fn get_repo_root<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .map_err(|e| {
            CrewError::UserError(format!("failed to execute git: {} (is git installed?)", e))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        return Ok(PathBuf::from(&git_output.stdout));
    }

    if git_output.stderr.contains("not a git repository") || git_output.stderr.contains("fatal:") {
        Err(CrewError::UserError(
            "not inside a git repository. Run this command from within the shared repository."
                .to_string(),
        ))
    } else {
        Err(CrewError::UserError(format!(
            "git command failed: {}",
            git_output.stderr
        )))
    }
}

/// Get the path of the main worktree (the original clone location).
///
/// From inside a linked worktree this returns the main checkout, not the
/// linked one. `git worktree list --porcelain` always lists the main worktree
/// first.
pub fn get_main_worktree<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let cwd = cwd.as_ref();
    let output = run_git(cwd, &["worktree", "list", "--porcelain"])?;

    for line in output.stdout.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            return Ok(PathBuf::from(path));
        }
    }

    get_repo_root(cwd)
}

/// Get the absolute path of the shared git directory (`<main>/.git`).
pub fn get_common_dir<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let cwd = cwd.as_ref();
    let output = run_git(cwd, &["rev-parse", "--git-common-dir"])?;
    let path = PathBuf::from(&output.stdout);
    let absolute = if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    };
    Ok(absolute.canonicalize().unwrap_or(absolute))
}

/// Resolve a revision to its full SHA.
pub fn rev_parse<P: AsRef<Path>>(cwd: P, rev: &str) -> Result<String> {
    Ok(run_git(cwd, &["rev-parse", rev])?.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_repo;
    use tempfile::TempDir;

    #[test]
    fn test_run_git_captures_stdout() {
        let temp_dir = create_test_repo();
        let output = run_git(temp_dir.path(), &["rev-parse", "--show-toplevel"]).unwrap();
        assert!(!output.stdout.is_empty());
    }

    #[test]
    fn test_run_git_failure_returns_git_error() {
        let temp_dir = create_test_repo();
        let result = run_git(temp_dir.path(), &["checkout", "nonexistent-branch"]);
        let err = result.unwrap_err();
        assert!(matches!(err, CrewError::GitError(_)));
        assert!(err.to_string().contains("git checkout failed"));
    }

    #[test]
    fn test_get_repo_root_from_subdirectory() {
        let temp_dir = create_test_repo();
        let subdir = temp_dir.path().join("subdir").join("nested");
        std::fs::create_dir_all(&subdir).unwrap();

        let root = get_repo_root(&subdir).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_get_repo_root_outside_repo_returns_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = get_repo_root(temp_dir.path()).unwrap_err();
        assert!(matches!(err, CrewError::UserError(_)));
        assert!(err.to_string().contains("not inside a git repository"));
    }

    #[test]
    fn test_get_common_dir_is_dot_git_of_main_checkout() {
        let temp_dir = create_test_repo();
        let common = get_common_dir(temp_dir.path()).unwrap();
        assert_eq!(common, temp_dir.path().canonicalize().unwrap().join(".git"));
    }

    #[test]
    fn test_rev_parse_head() {
        let temp_dir = create_test_repo();
        let sha = rev_parse(temp_dir.path(), "HEAD").unwrap();
        assert_eq!(sha.len(), 40);
    }

    #[test]
    fn test_git_output_lines() {
        let output = GitOutput {
            stdout: "line1\nline2".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.lines(), vec!["line1", "line2"]);

        let empty = GitOutput {
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(empty.lines().is_empty());
        assert!(empty.is_empty());
    }
}
