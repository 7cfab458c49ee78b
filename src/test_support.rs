use crate::config::PoolConfig;
use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A repository plus the bare repository registered as its `origin`.
pub(crate) struct RepoWithOrigin {
    pub(crate) repo: TempDir,
    pub(crate) origin: TempDir,
}

impl RepoWithOrigin {
    pub(crate) fn path(&self) -> &Path {
        self.repo.path()
    }
}

pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path();

    git(path, &["init"]);
    // Deterministic default branch name across environments.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);
    git(path, &["config", "commit.gpgsign", "false"]);

    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    std::fs::create_dir_all(path.join(".crew")).unwrap();
    std::fs::write(path.join(".crew").join("plan.md"), "# Plan\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-m", "Initial commit"]);

    temp_dir
}

pub(crate) fn create_test_repo_with_origin() -> RepoWithOrigin {
    let repo = create_test_repo();
    let origin = TempDir::new().unwrap();

    git(origin.path(), &["init", "--bare"]);
    let origin_str = origin.path().to_string_lossy().to_string();
    git(repo.path(), &["remote", "add", "origin", &origin_str]);
    git(repo.path(), &["push", "origin", "main"]);

    RepoWithOrigin { repo, origin }
}

/// A pool with one planner, two executors and a tester, all using `custom`
/// commands so nothing outside the test sandbox is invoked.
pub(crate) fn sample_config() -> PoolConfig {
    PoolConfig::from_yaml(
        r#"
project: demo
agents:
  - name: planner
    role: planner
    provider: custom
    command: "echo planned"
  - name: executor-1
    role: executor
    provider: custom
    command: "echo executed"
  - name: executor-2
    role: executor
    provider: custom
    command: "echo executed"
  - name: tester
    role: tester
    provider: custom
    command: "echo tested"
"#,
    )
    .unwrap()
}

pub(crate) fn git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }

    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Log sink shared between a test and its subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber that records this thread's log output.
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let value = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (value, logs)
}
