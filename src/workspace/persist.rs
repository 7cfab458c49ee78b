//! Commit and push an agent's work after a task.

use super::SHARED_EXCLUDE;
use super::status::{current_branch, has_changes};
use crate::config::GitSettings;
use crate::error::{CrewError, Result};
use crate::git::{rev_parse, run_git};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

const DEFAULT_PUSH_USER: &str = "oauth2";

/// Where executor branches are pushed.
#[derive(Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// A configured remote name.
    Remote(String),
    /// An explicit URL, possibly with credentials embedded.
    Url { url: String, redacted: String },
    /// No push destination; commits stay local.
    None,
}

impl PushTarget {
    /// Resolve the push target from settings.
    ///
    /// An explicit `push_url` wins; the token named by `push_token_env` is
    /// read through `lookup` and embedded. Otherwise the configured remote is
    /// used if the repository at `repo` has it.
    pub fn from_settings<F>(settings: &GitSettings, repo: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = settings.push_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let token = settings
                .push_token_env
                .as_deref()
                .and_then(&lookup)
                .filter(|t| !t.is_empty());
            let user = settings.push_user.as_deref().unwrap_or(DEFAULT_PUSH_USER);
            return PushTarget::Url {
                url: with_credentials(url, user, token.as_deref()),
                redacted: strip_credentials(url),
            };
        }

        if run_git(repo, &["remote", "get-url", &settings.remote]).is_ok() {
            PushTarget::Remote(settings.remote.clone())
        } else {
            PushTarget::None
        }
    }

    fn arg(&self) -> Option<&str> {
        match self {
            PushTarget::Remote(name) => Some(name),
            PushTarget::Url { url, .. } => Some(url),
            PushTarget::None => None,
        }
    }
}

impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushTarget::Remote(name) => f.write_str(name),
            PushTarget::Url { redacted, .. } => f.write_str(redacted),
            PushTarget::None => f.write_str("(none)"),
        }
    }
}

impl fmt::Debug for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PushTarget({})", self)
    }
}

/// Result of the push step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    /// Nothing was committed, so nothing was pushed.
    NotAttempted,
    /// Pushed; `retried` is true when the create-and-push fallback was needed.
    Pushed { retried: bool },
    /// No push destination configured.
    Skipped,
    /// Both attempts failed.
    Failed(String),
}

/// What [`persist_changes`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    /// SHA of the new commit, if one was made.
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub push: PushStatus,
}

impl PersistOutcome {
    /// Human-readable reason the work is not safely on the remote, if any.
    pub fn warning(&self) -> Option<String> {
        match (&self.commit, &self.push) {
            (None, _) => Some("no changes to commit".to_string()),
            (Some(_), PushStatus::Skipped) => {
                Some("no push remote configured; commit kept locally".to_string())
            }
            (Some(_), PushStatus::Failed(reason)) => Some(format!("push failed: {}", reason)),
            _ => None,
        }
    }

    pub fn pushed(&self) -> bool {
        matches!(self.push, PushStatus::Pushed { .. })
    }
}

/// Stage everything outside the shared tree, commit with `message`, and push
/// the current branch to `target`.
///
/// The first push is a plain `push <target> HEAD`; if it fails the branch is
/// created-and-pushed once more by explicit refspec. A failed push is
/// reported in the outcome, not as an error.
pub fn persist_changes<P: AsRef<Path>>(
    worktree_path: P,
    message: &str,
    target: &PushTarget,
) -> Result<PersistOutcome> {
    let path = worktree_path.as_ref();
    let branch = current_branch(path)?;

    if !has_changes(path)? {
        debug!(path = %path.display(), "nothing to commit");
        return Ok(PersistOutcome {
            commit: None,
            branch,
            push: PushStatus::NotAttempted,
        });
    }

    run_git(path, &["add", "-A", "--", ".", SHARED_EXCLUDE])?;
    run_git(path, &["commit", "--no-verify", "-m", message]).map_err(|e| {
        CrewError::GitError(format!("failed to commit in '{}': {}", path.display(), e))
    })?;
    let commit = rev_parse(path, "HEAD")?;
    info!(commit = %commit, branch = ?branch, "changes committed");

    let push = match (target.arg(), branch.as_deref()) {
        (None, _) => {
            warn!("no push remote configured, keeping commit local");
            PushStatus::Skipped
        }
        (Some(_), None) => PushStatus::Failed("HEAD is detached".to_string()),
        (Some(dest), Some(branch)) => push_with_retry(path, target, dest, branch),
    };

    Ok(PersistOutcome {
        commit: Some(commit),
        branch,
        push,
    })
}

fn push_with_retry(path: &Path, target: &PushTarget, dest: &str, branch: &str) -> PushStatus {
    match run_git(path, &["push", dest, "HEAD"]) {
        Ok(_) => {
            info!(target = %target, branch, "branch pushed");
            return PushStatus::Pushed { retried: false };
        }
        Err(e) => {
            debug!(target = %target, error = %redact(&e.to_string(), target), "push failed, retrying");
        }
    }

    let refspec = format!("HEAD:refs/heads/{}", branch);
    let mut args = vec!["push"];
    if matches!(target, PushTarget::Remote(_)) {
        args.push("-u");
    }
    args.extend([dest, refspec.as_str()]);

    match run_git(path, &args) {
        Ok(_) => {
            info!(target = %target, branch, "branch pushed on retry");
            PushStatus::Pushed { retried: true }
        }
        Err(e) => {
            let reason = redact(&e.to_string(), target);
            warn!(target = %target, branch, error = %reason, "push failed twice, commit kept locally");
            PushStatus::Failed(reason)
        }
    }
}

/// `https://host/path` -> `https://<user>:<token>@host/path`.
fn with_credentials(url: &str, user: &str, token: Option<&str>) -> String {
    let Some(token) = token else {
        return url.to_string();
    };
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    if scheme != "http" && scheme != "https" {
        return url.to_string();
    }
    let host_and_path = strip_userinfo(rest);
    format!("{}://{}:{}@{}", scheme, user, token, host_and_path)
}

fn strip_credentials(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => format!("{}://{}", scheme, strip_userinfo(rest)),
        None => url.to_string(),
    }
}

fn strip_userinfo(rest: &str) -> &str {
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    }
}

/// Replace the credentialed URL in git's messages with the redacted one.
fn redact(text: &str, target: &PushTarget) -> String {
    match target {
        PushTarget::Url { url, redacted } => text.replace(url.as_str(), redacted),
        _ => text.to_string(),
    }
}
