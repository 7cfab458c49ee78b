//! Repository context resolution.
//!
//! Finds the shared repository from any working directory (the main checkout,
//! an executor worktree, or a container whose `/workspace` is a worktree) and
//! derives the fixed layout:
//!
//! ```text
//! <repo>/
//!   .crew/             shared read-only metadata tree
//!     agents.yaml      agent pool configuration
//!   .worktrees/
//!     <agent>/         executor workspaces
//! ```

use crate::error::{CrewError, Result};
use crate::git;
use std::env;
use std::path::{Path, PathBuf};

/// Directory (relative to the repo root) holding the shared metadata tree.
pub const SHARED_DIR: &str = ".crew";

/// Directory (relative to the repo root) holding executor worktrees.
pub const WORKTREES_DIR: &str = ".worktrees";

/// File name of the agent pool configuration inside [`SHARED_DIR`].
pub const CONFIG_FILE: &str = "agents.yaml";

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "CREW_CONFIG";

/// Resolved paths for one repository. All paths are absolute.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// The main checkout (original clone location).
    pub repo_root: PathBuf,

    /// `{repo_root}/.worktrees/`.
    pub worktrees_dir: PathBuf,

    /// `{repo_root}/.crew/`.
    pub shared_dir: PathBuf,

    /// Agent pool configuration file.
    pub config_path: PathBuf,
}

impl ProjectContext {
    /// Resolve the context from the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            CrewError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd)
    }

    /// Resolve the context from a specific directory.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P) -> Result<Self> {
        let repo_root = Self::find_main_worktree(cwd.as_ref())?;
        Ok(Self::at_root(repo_root))
    }

    /// Build the context for a known repository root without touching git.
    pub fn at_root(repo_root: PathBuf) -> Self {
        let shared_dir = repo_root.join(SHARED_DIR);
        Self {
            worktrees_dir: repo_root.join(WORKTREES_DIR),
            config_path: shared_dir.join(CONFIG_FILE),
            shared_dir,
            repo_root,
        }
    }

    /// Replace the config path (from `--config` or `CREW_CONFIG`).
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        let path = path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = path {
            self.config_path = if path.is_absolute() {
                path
            } else {
                self.repo_root.join(path)
            };
        }
        self
    }

    /// Find the main worktree from anywhere inside the repository.
    ///
    /// Inside an agent container the main checkout path reported by git is a
    /// host path that is not mounted; in that case the current toplevel (the
    /// mounted workspace) is the best root available.
    fn find_main_worktree(cwd: &Path) -> Result<PathBuf> {
        let current_toplevel = git::get_repo_root(cwd)?;

        match git::get_main_worktree(cwd) {
            Ok(main_worktree) if main_worktree.exists() => Ok(main_worktree),
            _ => Ok(current_toplevel),
        }
    }

    /// Conventional workspace path for an agent.
    pub fn workspace_path(&self, agent_name: &str) -> PathBuf {
        self.worktrees_dir.join(agent_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_repo, git};
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_from_repo_root() {
        let temp_dir = create_test_repo();
        let ctx = ProjectContext::resolve_from(temp_dir.path()).unwrap();

        assert_eq!(
            ctx.repo_root.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
        assert!(ctx.worktrees_dir.ends_with(".worktrees"));
        assert!(ctx.shared_dir.ends_with(".crew"));
        assert!(ctx.config_path.ends_with(".crew/agents.yaml"));
    }

    #[test]
    fn test_resolve_from_executor_worktree() {
        let temp_dir = create_test_repo();
        let main_path = temp_dir.path();

        git(main_path, &["branch", "executor/executor-1"]);
        let worktree_path = main_path.join(".worktrees").join("executor-1");
        git(
            main_path,
            &[
                "worktree",
                "add",
                worktree_path.to_str().unwrap(),
                "executor/executor-1",
            ],
        );

        let ctx = ProjectContext::resolve_from(&worktree_path).unwrap();
        assert_eq!(
            ctx.repo_root.canonicalize().unwrap(),
            main_path.canonicalize().unwrap()
        );
    }

    #[test]
    fn test_resolve_outside_repo_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = ProjectContext::resolve_from(temp_dir.path()).unwrap_err();
        assert!(matches!(err, CrewError::UserError(_)));
    }

    #[test]
    #[serial]
    fn test_explicit_config_path_wins() {
        let ctx = ProjectContext::at_root(PathBuf::from("/repo"))
            .with_config_path(Some(PathBuf::from("custom/pool.yaml")));
        assert_eq!(ctx.config_path, PathBuf::from("/repo/custom/pool.yaml"));
    }

    #[test]
    #[serial]
    fn test_config_path_from_environment() {
        // SAFETY: serialised with the other environment-mutating tests.
        unsafe { env::set_var(CONFIG_ENV, "/etc/crew/agents.yaml") };
        let ctx = ProjectContext::at_root(PathBuf::from("/repo")).with_config_path(None);
        unsafe { env::remove_var(CONFIG_ENV) };

        assert_eq!(ctx.config_path, PathBuf::from("/etc/crew/agents.yaml"));
    }

    #[test]
    fn test_workspace_path() {
        let ctx = ProjectContext::at_root(PathBuf::from("/repo"));
        assert_eq!(
            ctx.workspace_path("executor-1"),
            PathBuf::from("/repo/.worktrees/executor-1")
        );
    }
}
