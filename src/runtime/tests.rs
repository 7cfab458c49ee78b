use super::*;
use crate::config::PoolConfig;
use crate::context::ProjectContext;
use crate::error::{CrewError, Result};
use crate::test_support::{create_test_repo, sample_config};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, AgentRuntime>,
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    runs: Vec<ContainerSpec>,
    removed: Vec<String>,
    builds: Vec<(PathBuf, String)>,
    fail_run: BTreeSet<String>,
    next_id: usize,
}

/// Records every call and keeps containers in memory.
struct FakeRuntime {
    state: Mutex<FakeState>,
    online: bool,
}

impl FakeRuntime {
    fn new() -> Self {
        let runtime = Self {
            state: Mutex::new(FakeState::default()),
            online: true,
        };
        runtime.add_image("agentcrew-agent:latest");
        runtime
    }

    /// Online, but with no images available.
    fn without_images() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            online: true,
        }
    }

    fn offline() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            online: false,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn add_image(&self, image: &str) {
        self.state().images.insert(image.to_string());
    }

    fn add_container(&self, name: &str, status: RuntimeStatus) {
        self.state().containers.insert(
            name.to_string(),
            AgentRuntime {
                container_id: format!("pre-{}", name),
                name: name.to_string(),
                status,
            },
        );
    }

    fn set_status(&self, name: &str, status: RuntimeStatus) {
        if let Some(container) = self.state().containers.get_mut(name) {
            container.status = status;
        }
    }

    fn fail_run_for(&self, name: &str) {
        self.state().fail_run.insert(name.to_string());
    }

    fn run_for(&self, name: &str) -> Option<ContainerSpec> {
        self.state().runs.iter().find(|s| s.name == name).cloned()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    fn ping(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(CrewError::Connectivity("fake daemon is down".to_string()))
        }
    }

    fn inspect(&self, name: &str) -> Result<Option<AgentRuntime>> {
        Ok(self.state().containers.get(name).cloned())
    }

    fn list(&self, name_prefix: &str) -> Result<Vec<AgentRuntime>> {
        Ok(self
            .state()
            .containers
            .values()
            .filter(|c| c.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }

    fn run_detached(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state();
        if state.fail_run.contains(&spec.name) {
            return Err(CrewError::RuntimeError(format!("cannot start {}", spec.name)));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(CrewError::RuntimeError(format!(
                "name {} is already in use",
                spec.name
            )));
        }
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            AgentRuntime {
                container_id: id.clone(),
                name: spec.name.clone(),
                status: RuntimeStatus::Running,
            },
        );
        state.runs.push(spec.clone());
        Ok(id)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.containers.remove(name);
        state.removed.push(name.to_string());
        Ok(())
    }

    fn network_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().networks.contains(name))
    }

    fn create_network(&self, name: &str) -> Result<()> {
        self.state().networks.insert(name.to_string());
        Ok(())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state().images.contains(image))
    }

    fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        let mut state = self.state();
        state.builds.push((context.to_path_buf(), tag.to_string()));
        state.images.insert(tag.to_string());
        Ok(())
    }
}

fn provisioner<'a>(
    config: &'a PoolConfig,
    ctx: &'a ProjectContext,
    runtime: &'a FakeRuntime,
) -> Provisioner<'a> {
    Provisioner::new(config, ctx, runtime)
        .with_home(None)
        .with_env(|_| None)
}

fn setup() -> (TempDir, ProjectContext, PoolConfig) {
    let repo = create_test_repo();
    let ctx = ProjectContext::at_root(repo.path().to_path_buf());
    (repo, ctx, sample_config())
}

fn statuses(summary: &UpSummary) -> Vec<(&str, &ProvisionStatus)> {
    summary
        .agents
        .iter()
        .map(|a| (a.agent.as_str(), &a.status))
        .collect()
}

#[test]
fn test_up_from_scratch_starts_everything() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();

    let summary = provisioner(&config, &ctx, &runtime).up().unwrap();

    assert!(summary.network_created);
    assert!(matches!(summary.queue, QueueProvision::Started { .. }));
    assert_eq!(summary.agents.len(), 4);
    for (agent, status) in statuses(&summary) {
        assert!(
            matches!(status, ProvisionStatus::Started { .. }),
            "{} was {:?}",
            agent,
            status
        );
    }
    assert!(summary.is_success());
    assert!(summary.images_built.is_empty());

    let spec = runtime.run_for("crew-agent-executor-1").unwrap();
    assert_eq!(spec.mounts[0].target, "/workspace");
    assert!(spec.mounts[0].source.ends_with(".worktrees/executor-1"));
    assert_eq!(spec.env["CREW_QUEUE_URL"], "redis://crew-queue:6379");
    assert_eq!(spec.network.as_deref(), Some("agentcrew"));
    let args = spec.to_run_args();
    let restart = args.iter().position(|a| a == "--restart").unwrap();
    assert_eq!(args[restart + 1], "unless-stopped");
    assert!(ctx.worktrees_dir.join("executor-1").is_dir());
    assert!(ctx.worktrees_dir.join("executor-2").is_dir());

    let planner = runtime.run_for("crew-agent-planner").unwrap();
    assert_eq!(planner.mounts[0].source, ctx.repo_root);
}

#[test]
fn test_up_is_idempotent() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();
    let provisioner = provisioner(&config, &ctx, &runtime);

    provisioner.up().unwrap();
    let runs_after_first = runtime.state().runs.len();

    let summary = provisioner.up().unwrap();
    assert!(!summary.network_created);
    assert!(matches!(summary.queue, QueueProvision::AlreadyRunning { .. }));
    for (_, status) in statuses(&summary) {
        assert!(matches!(status, ProvisionStatus::AlreadyRunning { .. }));
    }
    assert_eq!(runtime.state().runs.len(), runs_after_first);
    assert!(runtime.state().removed.is_empty());
}

#[test]
fn test_stopped_container_is_recreated() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();
    let provisioner = provisioner(&config, &ctx, &runtime);
    provisioner.up().unwrap();

    runtime.set_status("crew-agent-planner", RuntimeStatus::Stopped);
    let summary = provisioner.up().unwrap();

    let planner = &summary.agents[0];
    assert_eq!(planner.agent, "planner");
    assert!(matches!(planner.status, ProvisionStatus::Started { .. }));
    assert_eq!(runtime.state().removed, vec!["crew-agent-planner"]);
    assert!(matches!(
        summary.agents[1].status,
        ProvisionStatus::AlreadyRunning { .. }
    ));
}

#[test]
fn test_one_failing_agent_does_not_stop_others() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();
    runtime.fail_run_for("crew-agent-executor-2");

    let summary = provisioner(&config, &ctx, &runtime).up().unwrap();

    let failed: Vec<&str> = summary.failures().map(|a| a.agent.as_str()).collect();
    assert_eq!(failed, vec!["executor-2"]);
    assert!(runtime.run_for("crew-agent-tester").is_some());
    assert!(!summary.is_success());
}

#[test]
fn test_missing_image_is_built_once() {
    let repo = create_test_repo();
    let ctx = ProjectContext::at_root(repo.path().to_path_buf());
    let config = PoolConfig::from_yaml(
        r#"
agents:
  - name: planner
    role: planner
    provider: custom
    command: "echo planned"
  - name: executor-1
    role: executor
    provider: custom
    command: "echo executed"
runtime:
  image: crew-test:dev
  build_context: docker/agent
"#,
    )
    .unwrap();
    let runtime = FakeRuntime::new();

    let summary = provisioner(&config, &ctx, &runtime).up().unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.images_built, vec!["crew-test:dev"]);
    let builds = runtime.state().builds.clone();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].0, ctx.repo_root.join("docker/agent"));
}

#[test]
fn test_missing_image_without_build_context_fails_agents() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::without_images();

    let summary = provisioner(&config, &ctx, &runtime).up().unwrap();

    assert_eq!(summary.failures().count(), 4);
    let ProvisionStatus::Failed { reason } = &summary.agents[0].status else {
        panic!("expected failure");
    };
    assert!(reason.contains("runtime.build_context"));
    assert!(runtime.state().builds.is_empty());
}

#[test]
fn test_reachable_queue_is_not_provisioned() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();

    let summary = provisioner(&config, &ctx, &runtime)
        .with_queue_probe(|| true)
        .up()
        .unwrap();

    assert_eq!(summary.queue, QueueProvision::Reachable);
    assert!(runtime.run_for("crew-queue").is_none());
    let spec = runtime.run_for("crew-agent-planner").unwrap();
    assert_eq!(spec.env["CREW_QUEUE_URL"], config.queue.url);
}

#[test]
fn test_without_queue_skips_queue_container() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();

    let summary = provisioner(&config, &ctx, &runtime)
        .without_queue()
        .up()
        .unwrap();

    assert_eq!(summary.queue, QueueProvision::Skipped);
    assert!(runtime.run_for("crew-queue").is_none());
}

#[test]
fn test_unreachable_engine_is_fatal() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::offline();

    let err = provisioner(&config, &ctx, &runtime).up().unwrap_err();
    assert!(matches!(err, CrewError::Connectivity(_)));
    assert!(runtime.state().runs.is_empty());
}

#[test]
fn test_down_removes_all_prefixed_containers() {
    let (_repo, ctx, config) = setup();
    let runtime = FakeRuntime::new();
    runtime.add_container("crew-agent-planner", RuntimeStatus::Running);
    runtime.add_container("crew-agent-retired", RuntimeStatus::Stopped);
    runtime.add_container("crew-agent-Weird", RuntimeStatus::Running);
    runtime.add_container("crew-queue", RuntimeStatus::Running);
    runtime.add_container("postgres", RuntimeStatus::Running);

    let provisioner = provisioner(&config, &ctx, &runtime);
    let summary = provisioner.down(false).unwrap();

    assert_eq!(summary.removed, vec!["crew-agent-planner", "crew-agent-retired"]);
    assert!(!summary.queue_removed);
    assert!(runtime.inspect("crew-queue").unwrap().is_some());
    assert!(runtime.inspect("postgres").unwrap().is_some());
    assert!(runtime.inspect("crew-agent-Weird").unwrap().is_some());

    let summary = provisioner.down(true).unwrap();
    assert!(summary.removed.is_empty());
    assert!(summary.queue_removed);
    assert!(runtime.inspect("crew-queue").unwrap().is_none());
}
