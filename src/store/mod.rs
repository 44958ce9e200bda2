//! Workflow Store
//!
//! Persists named workflow snapshots. The engine never touches a store;
//! the surrounding application saves before a run and loads to replace the
//! in-memory graph wholesale.
//!
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`FileStore`]: one JSON document per workflow in a directory

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::Workflow;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Listing entry for a stored workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Save/load contract for workflow snapshots.
pub trait WorkflowStore: Send + Sync {
    /// Stores the workflow under its id, replacing any previous content.
    fn save(&self, workflow: &Workflow) -> Result<String>;

    /// Loads a workflow by id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) if nothing is stored
    /// under `id`.
    fn load(&self, id: &str) -> Result<Workflow>;

    /// Summaries of every stored workflow, most recently updated first.
    /// Does not load full graphs.
    fn list(&self) -> Result<Vec<WorkflowSummary>>;

    /// Removes a stored workflow.
    fn delete(&self, id: &str) -> Result<()>;
}

pub(crate) fn sort_recent_first(summaries: &mut [WorkflowSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}
