//! Run outcomes: overall status, per-path results and per-node states.

use std::collections::BTreeMap;

use serde::Serialize;

use super::context::ExecutionContext;
use super::log::{LogEntry, LogLevel};
use crate::monitoring::ExecutionTimeline;

/// Reason recorded when a run exceeds its visit bound.
pub const BOUND_EXCEEDED: &str = "execution bound exceeded";

/// Reason recorded when a decision selects a label with no edge.
pub const NO_MATCHING_BRANCH: &str = "no matching branch";

/// Lifecycle of a run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    /// Cancelled before every path could finish
    Aborted,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted)
    }
}

/// State of a node within one run, aggregated over every path.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    /// Never reached, including unselected decision branches
    Skipped,
}

/// How a single path ended.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum PathStatus {
    Completed,
    Failed(String),
    /// The next dispatch was refused because the run was cancelled
    Aborted,
}

/// Result of one path of a run.
#[derive(Serialize, Debug, Clone)]
pub struct PathOutcome {
    pub path_id: u64,
    /// The last node the path ran, or the node it was refused at
    pub last_node: String,
    pub status: PathStatus,
    pub context: ExecutionContext,
}

/// Everything a finished run produced.
///
/// The log is always complete, even for failed or aborted runs.
#[derive(Serialize, Debug, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    /// Why the run did not succeed
    pub reason: Option<String>,
    pub log: Vec<LogEntry>,
    /// Sorted by path id
    pub paths: Vec<PathOutcome>,
    pub node_states: BTreeMap<String, ExecutionState>,
    #[serde(skip)]
    pub timeline: ExecutionTimeline,
    /// Node visits dispatched
    pub visits: usize,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// One context per terminated path.
    pub fn final_contexts(&self) -> Vec<&ExecutionContext> {
        self.paths.iter().map(|p| &p.context).collect()
    }

    /// Trace entries recorded for a node, across all paths.
    pub fn entries_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.log.iter().filter(move |e| e.node_id == node_id)
    }

    /// Error entries of the trace.
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().filter(|e| e.level == LogLevel::Error)
    }

    /// Aggregated state of a node; unknown ids are `None`.
    pub fn state_of(&self, node_id: &str) -> Option<ExecutionState> {
        self.node_states.get(node_id).copied()
    }
}

/// Folds the state of one more visit into a node's aggregate. A failure on
/// any path sticks.
pub(crate) fn merge_state(current: ExecutionState, visit: ExecutionState) -> ExecutionState {
    match current {
        ExecutionState::Failed => ExecutionState::Failed,
        _ => visit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_dominates() {
        use ExecutionState::*;
        assert_eq!(merge_state(Completed, Failed), Failed);
        assert_eq!(merge_state(Failed, Completed), Failed);
        assert_eq!(merge_state(Failed, Running), Failed);
        assert_eq!(merge_state(Pending, Running), Running);
        assert_eq!(merge_state(Running, Completed), Completed);
    }

    #[test]
    fn test_status_finished() {
        assert!(!RunStatus::NotStarted.is_finished());
        assert!(!RunStatus::Running.is_finished());
        assert!(RunStatus::Aborted.is_finished());
    }

    #[test]
    fn test_path_status_serialization() {
        let failed = serde_json::to_value(PathStatus::Failed("boom".into())).unwrap();
        assert_eq!(failed, json!({ "status": "failed", "reason": "boom" }));

        let done = serde_json::to_value(PathStatus::Completed).unwrap();
        assert_eq!(done, json!({ "status": "completed" }));
    }
}
