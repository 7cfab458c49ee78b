//! Operator interrupt handling.

use crate::error::{CrewError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Set once when the operator asks the worker to stop.
///
/// The handler only flips the flag; the worker loop decides when it is safe
/// to act on it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal wired to SIGINT and SIGTERM. Call at most once per process.
    pub fn install() -> Result<Self> {
        let signal = Self::new();
        let handle = signal.clone();
        ctrlc::set_handler(move || {
            if !handle.is_requested() {
                info!("shutdown requested, finishing current task");
            }
            handle.request();
        })
        .map_err(|e| {
            CrewError::UserError(format!("failed to install interrupt handler: {}", e))
        })?;
        Ok(signal)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
