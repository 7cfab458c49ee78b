//! Implementation of the `crew queue` commands.

use super::Session;
use crate::cli::{QueueClearArgs, QueuePeekArgs};
use crate::error::Result;
use crate::queue::introspect::{self, ClearTarget};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let session = Session::load(config_path)?;
    let store = session.connect_queue()?;
    let depths = introspect::status(&session.config, &store)?;

    println!("Queues ({})", store.url());
    println!("======");
    let mut total = 0;
    for entry in &depths {
        total += entry.depth;
        println!("  {:<20} {:>4}", entry.agent, entry.depth);
    }
    println!("  --------");
    println!("  {:<20} {:>4}", "Total", total);
    Ok(())
}

pub fn cmd_peek(config_path: Option<PathBuf>, args: QueuePeekArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let store = session.connect_queue()?;
    let messages = introspect::peek(&session.config, &store, &args.agent, args.count)?;

    if messages.is_empty() {
        println!("No pending tasks for {}", args.agent);
        return Ok(());
    }
    for message in messages {
        let queued_at = DateTime::<Utc>::from_timestamp_millis(message.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| message.timestamp.to_string());
        println!("{}  {}  from {}", message.id, queued_at, message.from);
        println!("    {}", first_line(&message.content));
    }
    Ok(())
}

pub fn cmd_clear(config_path: Option<PathBuf>, args: QueueClearArgs) -> Result<()> {
    let session = Session::load(config_path)?;
    let store = session.connect_queue()?;
    let cleared = introspect::clear(&session.config, &store, &ClearTarget::parse(&args.target))?;

    for entry in cleared {
        println!("Cleared {} pending tasks for {}", entry.discarded, entry.agent);
    }
    Ok(())
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or("")
}
