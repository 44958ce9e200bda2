//! Directory-backed workflow store.
//!
//! Each workflow lives in `{dir}/{id}.json` as
//! `{ "updated_at": ..., "workflow": { ... } }`. Writes go to a temporary
//! file first and are renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{sort_recent_first, WorkflowStore, WorkflowSummary};
use crate::error::{Error, Result};
use crate::workflow::Workflow;

const EXTENSION: &str = "json";

#[derive(Serialize)]
struct StoredRef<'a> {
    updated_at: DateTime<Utc>,
    workflow: &'a Workflow,
}

#[derive(Deserialize)]
struct Stored {
    workflow: Workflow,
}

/// Only the fields a listing needs; nodes and edges are skipped unparsed.
#[derive(Deserialize)]
struct StoredHeader {
    updated_at: DateTime<Utc>,
    workflow: Header,
}

#[derive(Deserialize)]
struct Header {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Using workflow store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let usable = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !usable {
            return Err(Error::validation(format!(
                "workflow id '{}' cannot be used as a file name",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.{}", id, EXTENSION)))
    }
}

fn read_missing_as_not_found(path: &Path, id: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(id.to_string()),
        _ => Error::Io(e),
    })
}

impl WorkflowStore for FileStore {
    fn save(&self, workflow: &Workflow) -> Result<String> {
        let path = self.path_for(&workflow.id)?;
        let document = StoredRef {
            updated_at: Utc::now(),
            workflow,
        };
        let json = serde_json::to_string_pretty(&document)?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &path)?;

        info!("Saved workflow '{}' to {}", workflow.id, path.display());
        Ok(workflow.id.clone())
    }

    fn load(&self, id: &str) -> Result<Workflow> {
        let path = self.path_for(id)?;
        let content = read_missing_as_not_found(&path, id)?;
        let stored: Stored = serde_json::from_str(&content)?;
        debug!("Loaded workflow '{}' from {}", id, path.display());
        Ok(stored.workflow)
    }

    fn list(&self) -> Result<Vec<WorkflowSummary>> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }

            let header = fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|content| Ok(serde_json::from_str::<StoredHeader>(&content)?));
            match header {
                Ok(header) => summaries.push(WorkflowSummary {
                    id: header.workflow.id,
                    name: header.workflow.name,
                    updated_at: header.updated_at,
                }),
                Err(e) => warn!("Skipping unreadable store entry {}: {}", path.display(), e),
            }
        }

        sort_recent_first(&mut summaries);
        Ok(summaries)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(id.to_string()),
            _ => Error::Io(e),
        })?;
        info!("Deleted workflow '{}'", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Node, NodeKind};
    use tempfile::tempdir;

    fn sample(id: &str, name: &str) -> Workflow {
        let mut workflow = Workflow::with_id(id, name);
        workflow
            .insert_node(Node::new("check", NodeKind::Decision).with("condition", "x > 1"))
            .unwrap();
        workflow.insert_node(Node::new("end", NodeKind::End)).unwrap();
        workflow.add_edge("start", "check", None, false).unwrap();
        workflow.add_edge("check", "end", Some("true"), false).unwrap();
        workflow
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let workflow = sample("wf-1", "First");

        let id = store.save(&workflow).unwrap();
        assert_eq!(id, "wf-1");
        assert!(temp_dir.path().join("wf-1.json").exists());
        assert!(!temp_dir.path().join("wf-1.json.tmp").exists());

        let loaded = store.load("wf-1").unwrap();
        assert_eq!(loaded, workflow);

        // Graph content is stable across a second save.
        store.save(&loaded).unwrap();
        assert_eq!(store.load("wf-1").unwrap(), workflow);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        assert!(matches!(store.load("absent"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.save(&sample("a", "Alpha")).unwrap();
        store.save(&sample("b", "Beta")).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignore me").unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{").unwrap();

        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().any(|s| s.id == "a" && s.name == "Alpha"));
        assert!(summaries.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let workflow = Workflow::with_id("../escape", "bad");
        assert!(matches!(store.save(&workflow), Err(Error::Validation(_))));
    }

    #[test]
    fn test_delete() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("nested")).unwrap();
        store.save(&sample("a", "Alpha")).unwrap();

        store.delete("a").unwrap();
        assert!(matches!(store.delete("a"), Err(Error::NotFound(_))));
        assert!(store.list().unwrap().is_empty());
    }
}
