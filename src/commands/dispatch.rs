//! Implementation of the `crew dispatch` command.

use super::Session;
use crate::cli::DispatchArgs;
use crate::dispatcher::{DispatchOptions, DispatchResponse, Dispatcher};
use crate::error::{CrewError, Result};
use crate::message::{META_BRANCH, META_PERSIST_WARNING, MessageType};
use std::path::PathBuf;
use std::time::Duration;

pub fn cmd_dispatch(config_path: Option<PathBuf>, args: DispatchArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    // Reject unknown agents before touching the store.
    session.config.require_agent(&args.agent)?;

    let from = args.from.unwrap_or_else(default_sender);
    let mut options = DispatchOptions::from_config(&session.config, &from);
    options.wait = args.wait;
    options.auto_approve = args.auto_approve;
    options.project_path = args.project_path;
    if let Some(secs) = args.timeout {
        if secs == 0 {
            return Err(CrewError::UserError(
                "--timeout must be greater than 0".to_string(),
            ));
        }
        options.timeout = Duration::from_secs(secs);
    }

    let store = session.connect_queue()?;
    let dispatcher = Dispatcher::new(&session.config, &store);
    let receipt = dispatcher.dispatch(&args.agent, &args.content, &options)?;

    match receipt.response {
        DispatchResponse::NotRequested => {
            println!("{}", receipt.task_id);
            Ok(())
        }
        DispatchResponse::TimedOut => {
            println!("{}", receipt.task_id);
            Err(CrewError::ResponseTimeout {
                task_id: receipt.task_id,
                waited_secs: options.timeout.as_secs(),
            })
        }
        DispatchResponse::Received(reply) => {
            println!("{}", reply.content);
            if let Some(branch) = reply.metadata.get(META_BRANCH).and_then(|v| v.as_str()) {
                eprintln!("branch: {}", branch);
            }
            if let Some(warning) = reply
                .metadata
                .get(META_PERSIST_WARNING)
                .and_then(|v| v.as_str())
            {
                eprintln!("warning: {}", warning);
            }

            if reply.kind == MessageType::Error {
                return Err(CrewError::ExecutionError(format!(
                    "{} reported a failure for task {}",
                    reply.from, receipt.task_id
                )));
            }
            Ok(())
        }
    }
}

/// `operator@<hostname>`.
fn default_sender() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("operator@{}", host)
}
