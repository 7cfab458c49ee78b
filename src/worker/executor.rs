//! Runs an agent's command-line tool for one instruction.
//!
//! The tool runs in its own process group so an interrupt aimed at the
//! worker does not reach it. Output is drained on reader threads. When the
//! tool exits or times out the whole group is killed, so a background
//! process left holding the output pipes cannot stall the worker.

use crate::agent::AgentDescriptor;
use crate::error::{CrewError, Result};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Appended to the instruction when the task asks for auto-approval.
pub const AUTONOMY_DIRECTIVE: &str = "Work autonomously. Do not ask for confirmation or \
clarification; make the changes directly and finish the task.";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the reader threads get to finish once the tool's group is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one tool run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code, `None` when killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// Provider failure text found in the output.
    pub failure_marker: Option<&'static str>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0) && self.failure_marker.is_none()
    }

    /// The tool's answer: stdout, or stderr when stdout is empty.
    pub fn output(&self) -> &str {
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            self.stderr.trim()
        } else {
            stdout
        }
    }

    /// One-line reason for a failed run.
    pub fn failure_reason(&self, timeout: Duration) -> String {
        if self.timed_out {
            format!("timed out after {}s", timeout.as_secs())
        } else if let Some(marker) = self.failure_marker {
            format!("tool reported \"{}\"", marker)
        } else {
            match self.exit_code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by a signal".to_string(),
            }
        }
    }
}

/// Instruction text passed to the tool.
pub fn build_instruction(content: &str, auto_approve: bool) -> String {
    if auto_approve {
        format!("{}\n\n{}", content.trim_end(), AUTONOMY_DIRECTIVE)
    } else {
        content.to_string()
    }
}

/// Working directory for a task: the workspace itself, or `project_path`
/// inside it. Paths that leave the workspace are rejected.
pub fn resolve_working_dir(workspace: &Path, project_path: Option<&str>) -> Result<PathBuf> {
    let Some(relative) = project_path else {
        return Ok(workspace.to_path_buf());
    };

    let relative = Path::new(relative);
    let confined = !relative.is_absolute()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !confined {
        return Err(CrewError::ExecutionError(format!(
            "projectPath '{}' must be a relative path inside the workspace",
            relative.display()
        )));
    }

    let dir = workspace.join(relative);
    if !dir.is_dir() {
        return Err(CrewError::ExecutionError(format!(
            "projectPath '{}' does not exist in workspace '{}'",
            relative.display(),
            workspace.display()
        )));
    }
    Ok(dir)
}

/// Run `agent`'s tool with `instruction` in `working_dir`.
///
/// Only failure to start the tool is an error; a non-zero exit or a timeout
/// is reported in the result.
pub fn execute(
    agent: &AgentDescriptor,
    instruction: &str,
    auto_approve: bool,
    working_dir: &Path,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let invocation =
        agent
            .provider
            .invocation(&agent.name, instruction, agent.model.as_deref(), auto_approve)?;

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    debug!(agent = %agent.name, program = %invocation.program, dir = %working_dir.display(), "spawning tool");
    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        CrewError::ExecutionError(format!(
            "failed to execute '{}': {}\n\
             Fix: ensure the {} CLI is installed and in PATH.",
            invocation.program,
            e,
            agent.provider.name()
        ))
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let waited = wait_with_timeout(&mut child, timeout);
    // Descendants of the tool may still hold the output pipes open.
    kill_process_group(&mut child);
    let (exit_code, timed_out) = waited?;
    let duration = start.elapsed();

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    let failure_marker = agent
        .provider
        .failure_markers()
        .iter()
        .copied()
        .find(|marker| stdout.contains(marker) || stderr.contains(marker));

    Ok(ExecutionResult {
        exit_code,
        stdout,
        stderr,
        duration,
        timed_out,
        failure_marker,
    })
}

/// Output captured by a reader thread; `done` fires at end of stream.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Capture> {
    pipe.map(|mut pipe| {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
            let _ = tx.send(());
        });
        Capture { buf, done }
    })
}

/// Whatever the reader collected, waiting at most [`READER_GRACE`] for the
/// stream to close.
fn collect(capture: Option<Capture>) -> String {
    let Some(capture) = capture else {
        return String::new();
    };
    if capture.done.recv_timeout(READER_GRACE).is_err() {
        warn!("tool output still open after the tool finished, using partial output");
    }
    capture
        .buf
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Returns (exit_code, timed_out). The process group is killed by the caller.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<(Option<i32>, bool)> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status.code(), false)),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    warn!(pid = child.id(), "tool timed out, killing process group");
                    return Ok((None, true));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(CrewError::ExecutionError(format!(
                    "failed to check tool status: {}",
                    e
                )));
            }
        }
    }
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Provider, Role};
    use tempfile::TempDir;

    fn agent(command: &str) -> AgentDescriptor {
        AgentDescriptor {
            name: "executor-1".to_string(),
            role: Role::Executor,
            provider: Provider::resolve("custom", Some(command)).unwrap(),
            model: None,
            branch_prefix: None,
        }
    }

    #[test]
    fn test_success_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            &agent("echo {prompt}"),
            "hello crew",
            false,
            dir.path(),
            Duration::from_secs(10),
        )
        .unwrap();

        assert!(result.is_success());
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output(), "hello crew");
    }

    #[test]
    fn test_output_falls_back_to_stderr() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            &agent("sh -c 'echo \"$1\" >&2' sh {prompt}"),
            "only on stderr",
            false,
            dir.path(),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(result.output(), "only on stderr");
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            &agent("sh -c 'exit 3'"),
            "x",
            false,
            dir.path(),
            Duration::from_secs(10),
        )
        .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.failure_reason(Duration::from_secs(10)), "exited with code 3");
    }

    #[test]
    fn test_timeout_kills_tool_and_children() {
        let dir = TempDir::new().unwrap();
        let start = Instant::now();
        let result = execute(
            &agent("sh -c 'sleep 30 & sleep 30'"),
            "x",
            false,
            dir.path(),
            Duration::from_millis(300),
        )
        .unwrap();

        assert!(result.timed_out);
        assert!(!result.is_success());
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(result.failure_reason(Duration::from_secs(1)).starts_with("timed out"));
    }

    #[test]
    fn test_background_child_does_not_outlive_tool() {
        let dir = TempDir::new().unwrap();
        let start = Instant::now();
        let result = execute(
            &agent("sh -c 'sleep 30 & echo started'"),
            "x",
            false,
            dir.path(),
            Duration::from_secs(10),
        )
        .unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output(), "started");
    }

    #[test]
    fn test_missing_program_is_execution_error() {
        let dir = TempDir::new().unwrap();
        let err = execute(
            &agent("nonexistent_tool_xyz_123 {prompt}"),
            "x",
            false,
            dir.path(),
            Duration::from_secs(10),
        )
        .unwrap_err();
        assert!(matches!(err, CrewError::ExecutionError(_)));
        assert!(err.to_string().contains("failed to execute"));
    }

    #[test]
    fn test_runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        let result =
            execute(&agent("pwd"), "x", false, dir.path(), Duration::from_secs(10)).unwrap();
        assert_eq!(
            Path::new(result.output()).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_instruction_with_autonomy_directive() {
        assert_eq!(build_instruction("fix it", false), "fix it");
        let text = build_instruction("fix it\n", true);
        assert!(text.starts_with("fix it\n\n"));
        assert!(text.ends_with(AUTONOMY_DIRECTIVE));
    }

    #[test]
    fn test_working_dir_is_confined() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("services").join("api")).unwrap();

        assert_eq!(resolve_working_dir(dir.path(), None).unwrap(), dir.path());
        assert_eq!(
            resolve_working_dir(dir.path(), Some("services/api")).unwrap(),
            dir.path().join("services/api")
        );
        assert!(resolve_working_dir(dir.path(), Some("../outside")).is_err());
        assert!(resolve_working_dir(dir.path(), Some("/etc")).is_err());
        assert!(resolve_working_dir(dir.path(), Some("missing")).is_err());
    }

    #[test]
    fn test_failure_marker_turns_exit_zero_into_failure() {
        let result = ExecutionResult {
            exit_code: Some(0),
            stdout: "Invalid API key · Please run /login".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
            timed_out: false,
            failure_marker: Some("Invalid API key"),
        };
        assert!(!result.is_success());
        assert!(result.failure_reason(Duration::from_secs(1)).contains("Invalid API key"));
    }
}
