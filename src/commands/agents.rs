//! Implementation of the `crew agents` command.

use super::Session;
use crate::error::Result;
use crate::runtime::spec::agent_container_name;
use std::path::PathBuf;

pub fn cmd_agents(config_path: Option<PathBuf>) -> Result<()> {
    let session = Session::load(config_path)?;
    let config = &session.config;

    println!("Agents ({})", session.ctx.config_path.display());
    println!();
    println!(
        "{:<20} {:<9} {:<8} {:<16} {:<28} CONTAINER",
        "NAME", "ROLE", "PROVIDER", "MODEL", "BRANCH"
    );
    for agent in &config.agents {
        println!(
            "{:<20} {:<9} {:<8} {:<16} {:<28} {}",
            agent.name,
            agent.role.as_str(),
            agent.provider.name(),
            agent.model.as_deref().unwrap_or("-"),
            agent.workspace_branch().as_deref().unwrap_or("(main checkout)"),
            agent_container_name(config, &agent.name)
        );
    }
    Ok(())
}
