//! The closed set of supported agent command-line tools.
//!
//! A provider name from `agents.yaml` is resolved into a [`Provider`] once,
//! when the pool configuration is loaded. Everything that differs between
//! tools (argument layout, credential directories, secret variables, failure
//! text) hangs off the variant.

use super::template::{render_template, template_variables};
use crate::error::{CrewError, Result};
use std::collections::HashMap;

/// Variables a custom command template may reference.
const CUSTOM_TEMPLATE_VARIABLES: &[&str] = &["prompt", "model", "agent"];

/// Home directory of the agent user inside runtime images.
pub const CONTAINER_HOME: &str = "/home/agent";

/// An agent command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Anthropic's `claude` CLI.
    Claude,
    /// OpenAI's `codex` CLI.
    Codex,
    /// Google's `gemini` CLI.
    Gemini,
    /// Any other tool, described by a command template.
    Custom { command: String },
}

/// Credential material a provider keeps under the operator's home directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPath {
    /// Path relative to the operator's home directory.
    pub host: &'static str,
    /// Absolute mount target inside the runtime.
    pub container: &'static str,
}

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Provider {
    /// Resolve a provider from its configuration name.
    ///
    /// `command` is required for `custom` and rejected for every other
    /// provider.
    pub fn resolve(name: &str, command: Option<&str>) -> Result<Self> {
        let provider = match (name, command) {
            ("claude", None) => Provider::Claude,
            ("codex", None) => Provider::Codex,
            ("gemini", None) => Provider::Gemini,
            ("custom", Some(command)) => {
                validate_custom_command(command)?;
                Provider::Custom {
                    command: command.to_string(),
                }
            }
            ("custom", None) => {
                return Err(CrewError::ConfigError(
                    "provider 'custom' requires a 'command' template".to_string(),
                ));
            }
            ("claude" | "codex" | "gemini", Some(_)) => {
                return Err(CrewError::ConfigError(format!(
                    "provider '{}' does not accept a 'command'; use provider 'custom' instead",
                    name
                )));
            }
            (other, _) => {
                return Err(CrewError::ConfigError(format!(
                    "unknown provider '{}' (expected one of: claude, codex, gemini, custom)",
                    other
                )));
            }
        };
        Ok(provider)
    }

    /// Configuration name of this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
            Provider::Custom { .. } => "custom",
        }
    }

    /// Build the process invocation for one instruction.
    ///
    /// `auto_approve` switches the tool into its non-interactive "act without
    /// asking" mode where the tool has one.
    pub fn invocation(
        &self,
        agent: &str,
        prompt: &str,
        model: Option<&str>,
        auto_approve: bool,
    ) -> Result<Invocation> {
        let mut args: Vec<String> = Vec::new();
        let program = match self {
            Provider::Claude => {
                args.extend(["-p".to_string(), prompt.to_string()]);
                if let Some(model) = model {
                    args.extend(["--model".to_string(), model.to_string()]);
                }
                if auto_approve {
                    args.push("--dangerously-skip-permissions".to_string());
                }
                "claude".to_string()
            }
            Provider::Codex => {
                args.push("exec".to_string());
                if let Some(model) = model {
                    args.extend(["--model".to_string(), model.to_string()]);
                }
                if auto_approve {
                    args.push("--full-auto".to_string());
                }
                args.push(prompt.to_string());
                "codex".to_string()
            }
            Provider::Gemini => {
                if let Some(model) = model {
                    args.extend(["-m".to_string(), model.to_string()]);
                }
                if auto_approve {
                    args.push("--yolo".to_string());
                }
                args.extend(["-p".to_string(), prompt.to_string()]);
                "gemini".to_string()
            }
            Provider::Custom { command } => {
                return render_custom(command, agent, prompt, model);
            }
        };

        Ok(Invocation { program, args })
    }

    /// Credential files and directories to mount when present.
    pub fn credential_paths(&self) -> &'static [CredentialPath] {
        match self {
            Provider::Claude => &[
                CredentialPath {
                    host: ".claude",
                    container: "/home/agent/.claude",
                },
                CredentialPath {
                    host: ".claude.json",
                    container: "/home/agent/.claude.json",
                },
            ],
            Provider::Codex => &[CredentialPath {
                host: ".codex",
                container: "/home/agent/.codex",
            }],
            Provider::Gemini => &[CredentialPath {
                host: ".gemini",
                container: "/home/agent/.gemini",
            }],
            Provider::Custom { .. } => &[],
        }
    }

    /// Operator environment variables forwarded into the runtime when set.
    pub fn secret_env_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::Claude => &["ANTHROPIC_API_KEY"],
            Provider::Codex => &["OPENAI_API_KEY"],
            Provider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Provider::Custom { .. } => &[],
        }
    }

    /// Output fragments that mean the tool did not do the work even though it
    /// may have exited 0 (typically an authentication prompt).
    pub fn failure_markers(&self) -> &'static [&'static str] {
        match self {
            Provider::Claude => &["Invalid API key", "Please run /login"],
            Provider::Codex => &["Not logged in", "Please log in"],
            Provider::Gemini => &["Please set an Auth method"],
            Provider::Custom { .. } => &[],
        }
    }
}

fn validate_custom_command(command: &str) -> Result<()> {
    let words = shell_words::split(command).map_err(|e| {
        CrewError::ConfigError(format!(
            "failed to parse custom command '{}': {}\n\
             Fix: check for unmatched quotes or invalid escape sequences.",
            command, e
        ))
    })?;
    if words.is_empty() {
        return Err(CrewError::ConfigError(
            "custom command is empty".to_string(),
        ));
    }

    let names = template_variables(command).map_err(|e| {
        CrewError::ConfigError(format!("invalid custom command '{}': {}", command, e))
    })?;
    if let Some(unknown) = names
        .iter()
        .find(|name| !CUSTOM_TEMPLATE_VARIABLES.contains(&name.as_str()))
    {
        return Err(CrewError::ConfigError(format!(
            "custom command '{}' references unknown variable '{}' (available: {})",
            command,
            unknown,
            CUSTOM_TEMPLATE_VARIABLES.join(", ")
        )));
    }

    Ok(())
}

/// Split the template into words first, then substitute per word, so a prompt
/// containing spaces or quotes always arrives as exactly one argument.
fn render_custom(
    command: &str,
    agent: &str,
    prompt: &str,
    model: Option<&str>,
) -> Result<Invocation> {
    let words = shell_words::split(command).map_err(|e| {
        CrewError::ExecutionError(format!("failed to parse custom command '{}': {}", command, e))
    })?;

    let variables: HashMap<&str, &str> = [
        ("prompt", prompt),
        ("model", model.unwrap_or_default()),
        ("agent", agent),
    ]
    .into_iter()
    .collect();

    let mut rendered = words
        .iter()
        .map(|word| {
            render_template(word, &variables).map_err(|e| {
                CrewError::ExecutionError(format!(
                    "failed to render custom command '{}': {}",
                    command, e
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    let program = rendered.next().ok_or_else(|| {
        CrewError::ExecutionError(format!("custom command '{}' is empty", command))
    })?;

    Ok(Invocation {
        program,
        args: rendered.collect(),
    })
}
