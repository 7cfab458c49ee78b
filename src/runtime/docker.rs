//! [`ContainerRuntime`] over a docker-compatible command-line engine.

use super::{AgentRuntime, ContainerRuntime, ContainerSpec, RuntimeStatus};
use crate::error::{CrewError, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

const INSPECT_FORMAT: &str = "{{.Id}}|{{.Name}}|{{.State.Running}}";
const PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.State}}";

/// Drives `docker` (or `podman`) through its CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    engine: String,
}

struct EngineOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    fn output(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<EngineOutput> {
        debug!(engine = %self.engine, command = %args.first().unwrap_or(&""), "engine command");
        let output = Command::new(&self.engine)
            .args(args)
            .envs(envs.iter().copied())
            .output()
            .map_err(|e| {
                CrewError::Connectivity(format!(
                    "failed to execute '{}': {}\n\
                     Fix: install {} or set runtime.engine in agents.yaml.",
                    self.engine, e, self.engine
                ))
            })?;

        Ok(EngineOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a command that must succeed and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args, &[])?;
        self.check(args, output)
    }

    fn check(&self, args: &[&str], output: EngineOutput) -> Result<String> {
        if output.success {
            return Ok(output.stdout);
        }
        let message = if output.stderr.is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        if is_daemon_down(&message) {
            return Err(CrewError::Connectivity(format!(
                "{} daemon is not reachable: {}",
                self.engine, message
            )));
        }
        Err(CrewError::RuntimeError(format!(
            "{} {} failed: {}",
            self.engine,
            args.first().unwrap_or(&""),
            message
        )))
    }
}

impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        &self.engine
    }

    fn ping(&self) -> Result<()> {
        let output = self.output(&["version", "--format", "{{.Server.Version}}"], &[])?;
        if output.success {
            return Ok(());
        }
        Err(CrewError::Connectivity(format!(
            "{} daemon is not reachable: {}\n\
             Fix: start the container engine and retry.",
            self.engine, output.stderr
        )))
    }

    fn inspect(&self, name: &str) -> Result<Option<AgentRuntime>> {
        let args = ["container", "inspect", "--format", INSPECT_FORMAT, name];
        let output = self.output(&args, &[])?;
        if !output.success && is_missing(&output.stderr) {
            return Ok(None);
        }
        let stdout = self.check(&args, output)?;
        Ok(stdout.lines().next().and_then(parse_inspect_line))
    }

    fn list(&self, name_prefix: &str) -> Result<Vec<AgentRuntime>> {
        let filter = format!("name={}", name_prefix);
        let stdout = self.run(&["ps", "-a", "--filter", &filter, "--format", PS_FORMAT])?;
        // The engine's name filter matches substrings.
        Ok(stdout
            .lines()
            .filter_map(parse_ps_line)
            .filter(|c| c.name.starts_with(name_prefix))
            .collect())
    }

    fn run_detached(&self, spec: &ContainerSpec) -> Result<String> {
        let run_args = spec.to_run_args();
        let mut args = vec!["run", "-d"];
        args.extend(run_args.iter().map(String::as_str));

        let envs: Vec<(&str, &str)> = spec
            .secret_env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let output = self.output(&args, &envs)?;
        let stdout = self.check(&args, output)?;

        stdout
            .lines()
            .last()
            .map(str::to_string)
            .ok_or_else(|| {
                CrewError::RuntimeError(format!(
                    "{} run for '{}' printed no container id",
                    self.engine, spec.name
                ))
            })
    }

    fn remove(&self, name: &str) -> Result<()> {
        let args = ["rm", "-f", name];
        let output = self.output(&args, &[])?;
        if !output.success && is_missing(&output.stderr) {
            return Ok(());
        }
        self.check(&args, output).map(|_| ())
    }

    fn network_exists(&self, name: &str) -> Result<bool> {
        let args = ["network", "inspect", name];
        let output = self.output(&args, &[])?;
        if output.success {
            return Ok(true);
        }
        if is_missing(&output.stderr) {
            return Ok(false);
        }
        self.check(&args, output).map(|_| false)
    }

    fn create_network(&self, name: &str) -> Result<()> {
        self.run(&["network", "create", name]).map(|_| ())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        let args = ["image", "inspect", image];
        let output = self.output(&args, &[])?;
        if output.success {
            return Ok(true);
        }
        if is_missing(&output.stderr) {
            return Ok(false);
        }
        self.check(&args, output).map(|_| false)
    }

    fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        let context = context.to_string_lossy();
        self.run(&["build", "-t", tag, context.as_ref()]).map(|_| ())
    }
}

fn is_missing(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such") || stderr.contains("not found") || stderr.contains("no container")
}

fn is_daemon_down(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("cannot connect to the docker daemon")
        || message.contains("is the docker daemon running")
        || message.contains("unable to connect to podman")
}

fn parse_inspect_line(line: &str) -> Option<AgentRuntime> {
    let mut parts = line.splitn(3, '|');
    let id = parts.next()?.trim();
    let name = parts.next()?.trim().trim_start_matches('/');
    let running = parts.next()?.trim();
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some(AgentRuntime {
        container_id: id.to_string(),
        name: name.to_string(),
        status: if running == "true" {
            RuntimeStatus::Running
        } else {
            RuntimeStatus::Stopped
        },
    })
}

fn parse_ps_line(line: &str) -> Option<AgentRuntime> {
    let mut parts = line.splitn(3, '|');
    let id = parts.next()?.trim();
    let name = parts.next()?.trim();
    let state = parts.next()?.trim();
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some(AgentRuntime {
        container_id: id.to_string(),
        name: name.to_string(),
        status: if state.eq_ignore_ascii_case("running") {
            RuntimeStatus::Running
        } else {
            RuntimeStatus::Stopped
        },
    })
}
