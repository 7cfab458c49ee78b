//! Agent pool configuration.
//!
//! This module defines `PoolConfig`, the validated form of `.crew/agents.yaml`.
//! Unknown YAML fields are ignored, optional sections fall back to defaults,
//! and provider names are resolved once into [`crate::agent::Provider`].

mod model;
mod operations;
pub mod types;


pub use model::{AgentEntry, PoolConfig};
pub use operations::QUEUE_URL_ENV;
pub use types::{GitSettings, QueueSettings, RuntimeSettings, WorkerSettings};
