//! crew: task dispatch, worker execution and workspace isolation for a pool of
//! AI coding agents.
//!
//! This is the main entry point for the `crew` CLI. It parses arguments,
//! installs logging, dispatches to the appropriate command handler, and
//! handles errors with proper exit codes.

mod cli;
mod commands;
pub mod agent;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod exit_codes;
pub mod git;
pub mod logging;
pub mod message;
pub mod queue;
pub mod runtime;
pub mod worker;
pub mod workspace;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);
            if err.is_configuration() {
                eprintln!("Check the agent pool in .crew/agents.yaml (or --config).");
            }

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
