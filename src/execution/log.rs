//! Execution Trace
//!
//! The append-only, timestamp-ordered record of a run. Paths run
//! concurrently, so appends go through a single lock and the timestamp is
//! taken while holding it. Timestamps are the wall-clock time the log was
//! created plus monotonic elapsed time, so a wall clock stepping backwards
//! mid-run cannot reorder them.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::NodeKind;

/// Severity of a trace entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

/// A single line of the execution trace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub kind: NodeKind,
    /// Path that visited the node
    pub path_id: u64,
    pub message: String,
    pub level: LogLevel,
}

/// Shared, synchronized trace for one run.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    created_at: DateTime<Utc>,
    origin: Instant,
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            created_at: Utc::now(),
            origin: Instant::now(),
        }
    }
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.created_at + elapsed
    }

    /// Appends an entry stamped with the current time.
    pub fn append(
        &self,
        node_id: &str,
        kind: &NodeKind,
        path_id: u64,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let mut entries = self.lock();
        entries.push(LogEntry {
            timestamp: self.now(),
            node_id: node_id.to_string(),
            kind: kind.clone(),
            path_id,
            message: message.into(),
            level,
        });
    }

    /// Returns a copy of every entry so far.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A handler panicking mid-append cannot leave a half-written entry,
    // so a poisoned lock still holds a consistent trace.
    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle given to a handler for recording progress of one node visit,
/// such as individual retry attempts.
#[derive(Debug, Clone)]
pub struct NodeTrace {
    log: ExecutionLog,
    node_id: String,
    kind: NodeKind,
    path_id: u64,
}

impl NodeTrace {
    pub(crate) fn new(log: ExecutionLog, node_id: &str, kind: &NodeKind, path_id: u64) -> Self {
        Self {
            log,
            node_id: node_id.to_string(),
            kind: kind.clone(),
            path_id,
        }
    }

    /// A trace that records into its own private log. Useful for invoking
    /// handlers outside an engine run.
    pub fn detached(node_id: &str, kind: &NodeKind) -> Self {
        Self::new(ExecutionLog::new(), node_id, kind, 0)
    }

    /// Records an informational entry for this node visit.
    pub fn info(&self, message: impl Into<String>) {
        self.log
            .append(&self.node_id, &self.kind, self.path_id, LogLevel::Info, message);
    }

    /// Returns the entries of the underlying log.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }
}
