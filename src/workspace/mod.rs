//! Workspace isolation for executors.
//!
//! Each executor works in its own git worktree at `.worktrees/<agent>` on a
//! private branch (`<prefix>/<agent>`), so concurrent agents never share a
//! working directory. Planner and tester use the main checkout.
//!
//! - Creating, listing and ensuring workspaces
//! - Removing and pruning workspaces
//! - Status queries (branch, dirty, unpushed)
//! - Committing and pushing an agent's work

mod branch;
mod cleanup;
mod persist;
mod status;
mod worktree;

use std::path::PathBuf;

pub use branch::{branch_exists, create_branch};
pub use cleanup::{PruneReport, prune, remove};
pub use persist::{PersistOutcome, PushStatus, PushTarget, persist_changes};
pub use status::{current_branch, has_changes, unpushed_commits};
pub use worktree::{CreateOutcome, create, ensure, list};

/// An agent's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub agent_name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Checked-out branch, `None` when HEAD is detached.
    pub branch: Option<String>,
}

/// Pathspec excluding the shared metadata tree from status and staging.
pub(crate) const SHARED_EXCLUDE: &str = ":(exclude).crew";
