//! Workflow Execution Module
//!
//! Runs workflows and records what happened.
//!
//! # Architecture
//!
//! - [`engine`]: Scheduling of node visits, paths, the visit bound and cancellation
//! - [`context`]: The variables each path carries
//! - [`log`]: The timestamped execution trace
//! - [`result`]: Run status, path outcomes and node states

pub mod context;
pub mod engine;
pub mod log;
pub mod result;

pub use context::ExecutionContext;
pub use engine::{Engine, RunHandle};
pub use self::log::{ExecutionLog, LogEntry, LogLevel, NodeTrace};
pub use result::{ExecutionState, PathOutcome, PathStatus, RunResult, RunStatus};
