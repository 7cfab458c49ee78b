//! Agent descriptors and the command-line tools that back them.
//!
//! - **Descriptor**: name, role, provider, model and branch prefix of one agent
//! - **Provider**: the closed set of supported tools and how each is invoked
//! - **Template**: `{variable}` substitution for custom tool command lines

mod descriptor;
mod provider;
mod template;

pub use descriptor::{AgentDescriptor, DEFAULT_BRANCH_PREFIX, Role};
pub use provider::{CONTAINER_HOME, CredentialPath, Invocation, Provider};
pub use template::{TemplateError, render_template};
