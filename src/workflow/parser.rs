//! Workflow Parser
//!
//! Reads and writes the serialized graph format shared with the editor.
//! Files ending in `.yaml`/`.yml` are read as YAML, everything else as JSON.
//! Output is always pretty-printed JSON so that save → load → save is stable.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use super::model::Workflow;
use super::validator::validate;
use crate::error::{Error, Result};

/// Parses a workflow from its JSON representation.
pub fn from_json(content: &str) -> Result<Workflow> {
    Ok(serde_json::from_str(content)?)
}

/// Serializes a workflow to pretty-printed JSON.
pub fn to_json(workflow: &Workflow) -> Result<String> {
    Ok(serde_json::to_string_pretty(workflow)?)
}

/// Parses a workflow from YAML.
pub fn from_yaml(content: &str) -> Result<Workflow> {
    Ok(serde_yaml::from_str(content)?)
}

/// Loads a workflow file, logging any validation issues it carries.
///
/// Issues are not fatal here: an editor may save a half-built graph.
/// Structural problems are rejected later, when a run is started.
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("flow.json")?;
///     println!("Loaded {} nodes", workflow.nodes.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read workflow file '{}': {}", path.display(), e),
        ))
    })?;
    debug!("Workflow content loaded ({} bytes)", content.len());

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let workflow = if is_yaml {
        from_yaml(&content)?
    } else {
        from_json(&content)?
    };

    info!(
        "Parsed workflow '{}': {} nodes, {} edges",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len()
    );
    for issue in validate(&workflow) {
        warn!("{}", issue);
    }

    Ok(workflow)
}

/// Writes a workflow to a JSON file, creating parent directories.
pub fn save_workflow(workflow: &Workflow, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, to_json(workflow)?)?;
    info!("Saved workflow '{}' to {}", workflow.name, path.display());
    Ok(())
}
