//! Exit code constants for the crew CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state)
//! - 2: Configuration error (unreadable/invalid pool config, unknown agent)
//! - 3: Queue store unreachable or queue command failed
//! - 4: Git operation failure
//! - 5: Container runtime failure
//! - 6: Agent tool execution failure
//! - 7: Timed out waiting for a task response

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid local state.
pub const USER_ERROR: i32 = 1;

/// Configuration error: pool config missing, malformed, or naming an unknown agent.
pub const CONFIG_ERROR: i32 = 2;

/// Queue store failure: connection refused, dropped, or command rejected.
pub const QUEUE_FAILURE: i32 = 3;

/// Git operation failure: worktree, branch, commit or push errors.
pub const GIT_FAILURE: i32 = 4;

/// Container runtime failure: engine unavailable or a container command failed.
pub const RUNTIME_FAILURE: i32 = 5;

/// The agent's command-line tool failed or timed out.
pub const EXECUTION_FAILURE: i32 = 6;

/// `dispatch --wait` gave up before a response arrived. The task stays queued.
pub const RESPONSE_TIMEOUT: i32 = 7;
