//! In-memory workflow store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::debug;

use super::{sort_recent_first, WorkflowStore, WorkflowSummary};
use crate::error::{Error, Result};
use crate::workflow::Workflow;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (DateTime<Utc>, Workflow)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, (DateTime<Utc>, Workflow)>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, (DateTime<Utc>, Workflow)>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WorkflowStore for MemoryStore {
    fn save(&self, workflow: &Workflow) -> Result<String> {
        self.write()
            .insert(workflow.id.clone(), (Utc::now(), workflow.clone()));
        debug!("Stored workflow '{}' in memory", workflow.id);
        Ok(workflow.id.clone())
    }

    fn load(&self, id: &str) -> Result<Workflow> {
        self.read()
            .get(id)
            .map(|(_, workflow)| workflow.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<WorkflowSummary>> {
        let mut summaries: Vec<WorkflowSummary> = self
            .read()
            .values()
            .map(|(updated_at, workflow)| WorkflowSummary {
                id: workflow.id.clone(),
                name: workflow.name.clone(),
                updated_at: *updated_at,
            })
            .collect();
        sort_recent_first(&mut summaries);
        Ok(summaries)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
