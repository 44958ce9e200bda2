//! FlowRunner - Visual Workflow Execution Engine
//!
//! Runs user-authored graphs of typed steps (HTTP calls, conditional
//! branches, data transforms, AI-delegated tasks, timed delays and
//! start/end markers) and produces an ordered, timestamped execution trace.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Graph model, editing, validation and serialization
//! - [`handlers`]: The per-kind node behaviors and their registry
//! - [`execution`]: The engine, execution contexts and the trace
//! - [`monitoring`]: Per-run timeline of node visits
//! - [`store`]: Persistence of named workflow snapshots
//! - [`config`]: Engine tunables
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowrunner::handlers::{ReqwestClient, UnconfiguredAi};
//! use flowrunner::{Engine, EngineConfig, ExecutionContext, NodeKind, Workflow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build a workflow: start -> wait -> end
//!     let mut workflow = Workflow::new("example");
//!     let mut config = serde_json::Map::new();
//!     config.insert("duration_ms".into(), 100.into());
//!     let wait = workflow.add_node(NodeKind::Delay, config)?;
//!     let end = workflow.add_node(NodeKind::End, Default::default())?;
//!     workflow.add_edge("start", &wait, None, false)?;
//!     workflow.add_edge(&wait, &end, None, false)?;
//!
//!     // Execute it
//!     let engine = Engine::builtin(
//!         Arc::new(ReqwestClient::new()),
//!         Arc::new(UnconfiguredAi),
//!         EngineConfig::default(),
//!     );
//!     let result = engine.run(workflow, ExecutionContext::new()).await?;
//!     assert!(result.succeeded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod monitoring;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use execution::{Engine, ExecutionContext, LogEntry, LogLevel, RunHandle, RunResult, RunStatus};
pub use handlers::{HandlerRegistry, NodeHandler, NodeResult, Outcome};
pub use store::{FileStore, MemoryStore, WorkflowStore};
pub use workflow::model::{Edge, Node, NodeKind, Workflow};
pub use workflow::parser::{load_workflow, save_workflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";
