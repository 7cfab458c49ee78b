//! Container specifications and their `run` arguments.

use crate::agent::{AgentDescriptor, CONTAINER_HOME};
use crate::config::PoolConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mount point of the agent's workspace inside its container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Port the queue store listens on inside its container.
pub const QUEUE_CONTAINER_PORT: u16 = 6379;

/// Restart policy for pool containers. A worker exits when it loses the
/// queue store, and the engine brings it back.
pub const RESTART_POLICY: &str = "unless-stopped";

pub const LABEL_PROJECT: &str = "agentcrew.project";
pub const LABEL_AGENT: &str = "agentcrew.agent";
pub const LABEL_ROLE: &str = "agentcrew.role";

/// A bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    fn arg(&self) -> String {
        let mut arg = format!("{}:{}", self.source.display(), self.target);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Everything needed to start one detached container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub network_alias: Option<String>,
    pub workdir: Option<String>,
    /// `--restart` policy, the engine's default when `None`.
    pub restart: Option<String>,
    pub mounts: Vec<Mount>,
    /// Plain environment, passed as `-e KEY=VALUE`.
    pub env: BTreeMap<String, String>,
    /// Secrets, passed as `-e KEY` and handed to the engine process through
    /// its own environment so they never appear in its arguments.
    pub secret_env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// `host:container` port mappings.
    pub publish: Vec<String>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Arguments following `run -d`.
    pub fn to_run_args(&self) -> Vec<String> {
        let mut args = vec!["--name".to_string(), self.name.clone()];

        if let Some(network) = &self.network {
            args.extend(["--network".to_string(), network.clone()]);
        }
        if let Some(alias) = &self.network_alias {
            args.extend(["--network-alias".to_string(), alias.clone()]);
        }
        if let Some(workdir) = &self.workdir {
            args.extend(["-w".to_string(), workdir.clone()]);
        }
        if let Some(restart) = &self.restart {
            args.extend(["--restart".to_string(), restart.clone()]);
        }
        for mount in &self.mounts {
            args.extend(["-v".to_string(), mount.arg()]);
        }
        for (key, value) in &self.env {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for key in self.secret_env.keys() {
            args.extend(["-e".to_string(), key.clone()]);
        }
        for (key, value) in &self.labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }
        for mapping in &self.publish {
            args.extend(["-p".to_string(), mapping.clone()]);
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Host-side facts an agent container is built from.
pub struct AgentMounts<'a> {
    /// The agent's workspace on the host.
    pub workspace: &'a Path,
    /// The shared metadata tree on the host.
    pub shared_dir: &'a Path,
    /// The repository's common `.git` directory on the host.
    pub git_common_dir: &'a Path,
    /// Operator home directory, for provider credentials.
    pub home: Option<&'a Path>,
}

/// Container name for an agent.
pub fn agent_container_name(config: &PoolConfig, agent: &str) -> String {
    format!("{}{}", config.runtime.container_prefix, agent)
}

/// Queue address as seen from inside the shared network.
pub fn in_network_queue_url(config: &PoolConfig) -> String {
    format!(
        "redis://{}:{}",
        config.runtime.queue_container, QUEUE_CONTAINER_PORT
    )
}

/// Spec for an agent container running `crew worker <agent>`.
pub fn agent_spec<F>(
    config: &PoolConfig,
    agent: &AgentDescriptor,
    mounts: &AgentMounts<'_>,
    queue_url: &str,
    lookup: F,
) -> ContainerSpec
where
    F: Fn(&str) -> Option<String>,
{
    let mut spec = ContainerSpec {
        name: agent_container_name(config, &agent.name),
        image: config.image_for(&agent.name).to_string(),
        network: Some(config.runtime.network.clone()),
        network_alias: Some(agent.name.clone()),
        workdir: Some(CONTAINER_WORKSPACE.to_string()),
        restart: Some(RESTART_POLICY.to_string()),
        command: vec!["crew".to_string(), "worker".to_string(), agent.name.clone()],
        ..ContainerSpec::default()
    };

    spec.mounts.push(Mount {
        source: mounts.workspace.to_path_buf(),
        target: CONTAINER_WORKSPACE.to_string(),
        read_only: false,
    });
    spec.mounts.push(Mount {
        source: mounts.shared_dir.to_path_buf(),
        target: format!("{}/{}", CONTAINER_WORKSPACE, crate::context::SHARED_DIR),
        read_only: true,
    });
    // Worktree `.git` files point at the common dir by absolute host path.
    spec.mounts.push(Mount {
        source: mounts.git_common_dir.to_path_buf(),
        target: mounts.git_common_dir.display().to_string(),
        read_only: false,
    });
    if let Some(home) = mounts.home {
        for credential in agent.provider.credential_paths() {
            let source = home.join(credential.host);
            if source.exists() {
                spec.mounts.push(Mount {
                    source,
                    target: credential.container.to_string(),
                    read_only: false,
                });
            }
        }
    }

    let env = &mut spec.env;
    env.insert("CREW_AGENT_NAME".into(), agent.name.clone());
    env.insert("CREW_AGENT_ROLE".into(), agent.role.to_string());
    env.insert("CREW_PROVIDER".into(), agent.provider.name().to_string());
    if let Some(model) = &agent.model {
        env.insert("CREW_MODEL".into(), model.clone());
    }
    env.insert(
        crate::worker::WORKSPACE_ENV.into(),
        CONTAINER_WORKSPACE.to_string(),
    );
    env.insert(crate::config::QUEUE_URL_ENV.into(), queue_url.to_string());
    env.insert("HOME".into(), CONTAINER_HOME.to_string());

    let email = format!("{}@agentcrew.local", agent.name);
    for prefix in ["GIT_AUTHOR", "GIT_COMMITTER"] {
        env.insert(format!("{}_NAME", prefix), agent.name.clone());
        env.insert(format!("{}_EMAIL", prefix), email.clone());
    }

    let mut secret_names: Vec<&str> = agent.provider.secret_env_vars().to_vec();
    if let Some(token_env) = config.git.push_token_env.as_deref() {
        secret_names.push(token_env);
    }
    for name in secret_names {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            spec.secret_env.insert(name.to_string(), value);
        }
    }

    spec.labels.insert(LABEL_PROJECT.into(), config.project.clone());
    spec.labels.insert(LABEL_AGENT.into(), agent.name.clone());
    spec.labels.insert(LABEL_ROLE.into(), agent.role.to_string());

    spec
}

/// Spec for the shared queue store container.
pub fn queue_spec(config: &PoolConfig) -> ContainerSpec {
    let runtime = &config.runtime;
    let mut spec = ContainerSpec {
        name: runtime.queue_container.clone(),
        image: runtime.queue_image.clone(),
        network: Some(runtime.network.clone()),
        network_alias: Some(runtime.queue_container.clone()),
        restart: Some(RESTART_POLICY.to_string()),
        publish: vec![format!("{}:{}", runtime.queue_port, QUEUE_CONTAINER_PORT)],
        ..ContainerSpec::default()
    };
    spec.labels.insert(LABEL_PROJECT.into(), config.project.clone());
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_config;
    use tempfile::TempDir;

    fn claude_config() -> PoolConfig {
        PoolConfig::from_yaml(
            r#"
project: shop
agents:
  - name: planner
    role: planner
    provider: claude
    model: opus
  - name: executor-1
    role: executor
    provider: codex
git:
  push_token_env: GITLAB_TOKEN
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_run_args_layout() {
        let mut spec = ContainerSpec {
            name: "crew-agent-x".to_string(),
            image: "img:1".to_string(),
            network: Some("net".to_string()),
            workdir: Some("/workspace".to_string()),
            command: vec!["crew".to_string(), "worker".to_string(), "x".to_string()],
            ..ContainerSpec::default()
        };
        spec.mounts.push(Mount {
            source: PathBuf::from("/repo/.crew"),
            target: "/workspace/.crew".to_string(),
            read_only: true,
        });
        spec.env.insert("A".into(), "1".into());
        spec.secret_env.insert("TOKEN".into(), "s3cret".into());

        let args = spec.to_run_args();
        assert_eq!(
            args,
            vec![
                "--name", "crew-agent-x", "--network", "net", "-w", "/workspace", "-v",
                "/repo/.crew:/workspace/.crew:ro", "-e", "A=1", "-e", "TOKEN", "img:1", "crew",
                "worker", "x"
            ]
        );
        assert!(!args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn test_agent_spec_mounts_and_env() {
        let config = claude_config();
        let planner = config.require_agent("planner").unwrap();
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join(".claude")).unwrap();

        let mounts = AgentMounts {
            workspace: Path::new("/repo"),
            shared_dir: Path::new("/repo/.crew"),
            git_common_dir: Path::new("/repo/.git"),
            home: Some(home.path()),
        };
        let spec = agent_spec(&config, planner, &mounts, "redis://crew-queue:6379", |key| {
            match key {
                "ANTHROPIC_API_KEY" => Some("sk-ant".to_string()),
                "GITLAB_TOKEN" => Some("glpat".to_string()),
                _ => None,
            }
        });

        assert_eq!(spec.name, "crew-agent-planner");
        assert_eq!(spec.image, "agentcrew-agent:latest");
        assert_eq!(spec.command, vec!["crew", "worker", "planner"]);
        assert_eq!(spec.restart.as_deref(), Some("unless-stopped"));

        let targets: Vec<&str> = spec.mounts.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["/workspace", "/workspace/.crew", "/repo/.git", "/home/agent/.claude"]
        );
        assert!(spec.mounts[1].read_only);

        assert_eq!(spec.env["CREW_AGENT_NAME"], "planner");
        assert_eq!(spec.env["CREW_AGENT_ROLE"], "planner");
        assert_eq!(spec.env["CREW_PROVIDER"], "claude");
        assert_eq!(spec.env["CREW_MODEL"], "opus");
        assert_eq!(spec.env["CREW_WORKSPACE"], "/workspace");
        assert_eq!(spec.env["CREW_QUEUE_URL"], "redis://crew-queue:6379");
        assert_eq!(spec.env["GIT_AUTHOR_EMAIL"], "planner@agentcrew.local");

        assert_eq!(
            spec.secret_env.keys().collect::<Vec<_>>(),
            vec!["ANTHROPIC_API_KEY", "GITLAB_TOKEN"]
        );
        assert_eq!(spec.labels[LABEL_PROJECT], "shop");
    }

    #[test]
    fn test_missing_credentials_are_not_mounted() {
        let config = sample_config();
        let agent = config.require_agent("executor-1").unwrap();
        let mounts = AgentMounts {
            workspace: Path::new("/repo/.worktrees/executor-1"),
            shared_dir: Path::new("/repo/.crew"),
            git_common_dir: Path::new("/repo/.git"),
            home: None,
        };
        let spec = agent_spec(&config, agent, &mounts, "redis://q:6379", |_| None);
        assert_eq!(spec.mounts.len(), 3);
        assert!(spec.secret_env.is_empty());
        assert!(!spec.env.contains_key("CREW_MODEL"));
    }

    #[test]
    fn test_queue_spec_publishes_port() {
        let config = sample_config();
        let spec = queue_spec(&config);
        assert_eq!(spec.name, "crew-queue");
        assert_eq!(spec.image, "redis:7-alpine");
        assert_eq!(spec.publish, vec!["6379:6379"]);
        assert_eq!(spec.network_alias.as_deref(), Some("crew-queue"));
        assert_eq!(spec.restart.as_deref(), Some("unless-stopped"));
        assert_eq!(in_network_queue_url(&config), "redis://crew-queue:6379");
    }
}
