//! Workflow Data Model
//!
//! Core data structures representing workflow nodes and the edges
//! connecting them, plus the edit operations used by the graph editor.
//!
//! # Example JSON Format
//!
//! ```json
//! {
//!   "id": "3f1c...",
//!   "name": "fetch status",
//!   "nodes": [
//!     { "id": "start", "kind": "start", "config": {}, "position": { "x": 0.0, "y": 0.0 } },
//!     { "id": "fetch", "kind": "api_call",
//!       "config": { "method": "GET", "url": "https://example.com/ok", "timeout_seconds": 10 },
//!       "position": { "x": 200.0, "y": 0.0 } },
//!     { "id": "done", "kind": "end", "config": {}, "position": { "x": 400.0, "y": 0.0 } }
//!   ],
//!   "edges": [
//!     { "id": "e1", "source": "start", "target": "fetch", "label": null },
//!     { "id": "e2", "source": "fetch", "target": "done", "label": null }
//!   ]
//! }
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind-specific node parameters.
pub type Config = Map<String, Value>;

/// Id given to the start node of a freshly created workflow.
pub const START_NODE_ID: &str = "start";

/// Label selecting the edge taken when a decision evaluates to true.
pub const LABEL_TRUE: &str = "true";

/// Label selecting the edge taken when a decision evaluates to false.
pub const LABEL_FALSE: &str = "false";

/// The declared kind of a node, which selects the handler that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Start,
    End,
    ApiCall,
    Decision,
    Transform,
    AiTask,
    Delay,
    /// A kind supplied by an application-registered handler.
    Custom(String),
}

impl NodeKind {
    /// All built-in kinds.
    pub const BUILTIN: [NodeKind; 7] = [
        NodeKind::Start,
        NodeKind::End,
        NodeKind::ApiCall,
        NodeKind::Decision,
        NodeKind::Transform,
        NodeKind::AiTask,
        NodeKind::Delay,
    ];

    /// Creates a custom kind. Built-in names resolve to the built-in kind.
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        name.parse().unwrap_or(NodeKind::Custom(name))
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::ApiCall => "api_call",
            NodeKind::Decision => "decision",
            NodeKind::Transform => "transform",
            NodeKind::AiTask => "ai_task",
            NodeKind::Delay => "delay",
            NodeKind::Custom(name) => name,
        }
    }

    /// Config keys that must be present for this kind.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            NodeKind::ApiCall => &["method", "url", "timeout_seconds"],
            NodeKind::Decision => &["condition"],
            NodeKind::Transform => &["operation"],
            NodeKind::AiTask => &["model", "instruction"],
            NodeKind::Delay => &["duration_ms"],
            NodeKind::Start | NodeKind::End | NodeKind::Custom(_) => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    /// Parses a built-in kind. Unknown names are rejected; use
    /// [`NodeKind::custom`] for application-defined kinds.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "start" => Ok(NodeKind::Start),
            "end" => Ok(NodeKind::End),
            "api_call" => Ok(NodeKind::ApiCall),
            "decision" => Ok(NodeKind::Decision),
            "transform" => Ok(NodeKind::Transform),
            "ai_task" => Ok(NodeKind::AiTask),
            "delay" => Ok(NodeKind::Delay),
            other => Err(Error::validation(format!("unknown node kind '{}'", other))),
        }
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(NodeKind::custom(name))
    }
}

/// Display coordinates, preserved only for round-tripping.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step in a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier, stable across saves
    pub id: String,

    /// Kind selecting the handler for this node
    pub kind: NodeKind,

    /// Kind-specific parameters
    #[serde(default)]
    pub config: Config,

    /// Editor coordinates
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Creates a node with an empty config at the origin.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: Config::new(),
            position: Position::default(),
        }
    }

    /// Sets a single config entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole config.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the editor coordinates.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Returns a string config entry, if present.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Returns an unsigned integer config entry, if present.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }
}

/// A directed connection between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,

    /// `"true"`/`"false"` on decision outputs, otherwise unlabeled
    #[serde(default)]
    pub label: Option<String>,
}

/// A complete workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Checks that a config carries the keys its kind requires.
pub fn validate_config(kind: &NodeKind, config: &Config) -> Result<()> {
    for key in kind.required_keys() {
        match config.get(*key) {
            None | Some(Value::Null) => {
                return Err(Error::validation(format!(
                    "{} node requires config key '{}'",
                    kind, key
                )));
            }
            Some(value) => check_config_type(kind, key, value)?,
        }
    }
    Ok(())
}

fn check_config_type(kind: &NodeKind, key: &str, value: &Value) -> Result<()> {
    let ok = match key {
        "timeout_seconds" => value.as_u64().is_some_and(|seconds| seconds >= 1),
        "duration_ms" => value.is_u64(),
        "method" | "url" | "condition" | "model" | "instruction" => {
            value.as_str().is_some_and(|s| !s.trim().is_empty())
        }
        "operation" => value.is_string() || value.is_object(),
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} node has invalid value for '{}': {}",
            kind, key, value
        )))
    }
}

fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

impl Workflow {
    /// Creates a workflow containing a single start node.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Creates a workflow with an explicit id and a single start node.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: vec![Node::new(START_NODE_ID, NodeKind::Start)],
            edges: Vec::new(),
        }
    }

    /// Renames the workflow.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Adds a node of the given kind with a generated id.
    pub fn add_node(&mut self, kind: NodeKind, config: Config) -> Result<String> {
        let id = generate_id(kind.as_str());
        self.insert_node(Node::new(id.clone(), kind).with_config(config))?;
        Ok(id)
    }

    /// Adds a fully specified node.
    pub fn insert_node(&mut self, node: Node) -> Result<()> {
        if node.id.trim().is_empty() {
            return Err(Error::validation("node id must not be blank"));
        }
        if self.node(&node.id).is_some() {
            return Err(Error::validation(format!("node '{}' already exists", node.id)));
        }
        if node.kind == NodeKind::Start && self.nodes.iter().any(|n| n.kind == NodeKind::Start) {
            return Err(Error::validation("workflow already has a start node"));
        }
        validate_config(&node.kind, &node.config)?;

        self.nodes.push(node);
        Ok(())
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::validation(format!("node '{}' not found", id)))?;

        self.edges.retain(|e| e.source != id && e.target != id);
        Ok(self.nodes.remove(index))
    }

    /// Replaces a node's config after checking the keys its kind requires.
    pub fn update_config(&mut self, id: &str, config: Config) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::validation(format!("node '{}' not found", id)))?;

        validate_config(&node.kind, &config)?;
        node.config = config;
        Ok(())
    }

    /// Moves a node in the editor.
    pub fn set_position(&mut self, id: &str, position: Position) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::validation(format!("node '{}' not found", id)))?;
        node.position = position;
        Ok(())
    }

    /// Connects two nodes.
    ///
    /// Self-loops are rejected unless `allow_self_loop` is set, since they
    /// repeat a node until the run's visit bound is hit.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        label: Option<&str>,
        allow_self_loop: bool,
    ) -> Result<String> {
        for endpoint in [source, target] {
            if self.node(endpoint).is_none() {
                return Err(Error::validation(format!("node '{}' does not exist", endpoint)));
            }
        }
        if source == target && !allow_self_loop {
            return Err(Error::validation(format!(
                "self-loop on '{}' requires explicit opt-in",
                source
            )));
        }
        if let Some(label) = label {
            if label != LABEL_TRUE && label != LABEL_FALSE {
                return Err(Error::validation(format!(
                    "edge label must be '{}' or '{}', got '{}'",
                    LABEL_TRUE, LABEL_FALSE, label
                )));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.label.as_deref() == label)
        {
            return Err(Error::validation(format!(
                "edge {} -> {} already exists",
                source, target
            )));
        }

        let id = generate_id("edge");
        self.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            label: label.map(str::to_string),
        });
        Ok(id)
    }

    /// Removes an edge by id.
    pub fn remove_edge(&mut self, id: &str) -> Result<Edge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::validation(format!("edge '{}' not found", id)))?;
        Ok(self.edges.remove(index))
    }

    /// Gets a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Gets an edge by id.
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Returns edges leaving the given node, in insertion order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Returns every node of kind `start`.
    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Start).collect()
    }

    /// Returns the start node when there is exactly one.
    pub fn start_node(&self) -> Option<&Node> {
        match self.start_nodes().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Ids of all nodes reachable from the start node (start included).
    pub fn reachable_from_start(&self) -> HashSet<String> {
        let mut seen = HashSet::new();
        let Some(start) = self.start_node() else {
            return seen;
        };

        let mut queue = VecDeque::from([start.id.clone()]);
        seen.insert(start.id.clone());

        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(&current) {
                if seen.insert(edge.target.clone()) {
                    queue.push_back(edge.target.clone());
                }
            }
        }
        seen
    }

    /// Returns the number of nodes in the workflow.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the workflow has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Config {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_workflow_has_start() {
        let workflow = Workflow::new("demo");
        assert_eq!(workflow.len(), 1);
        assert_eq!(workflow.start_node().unwrap().id, START_NODE_ID);
        assert!(!workflow.id.is_empty());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("api_call".parse::<NodeKind>().unwrap(), NodeKind::ApiCall);
        assert_eq!("delay".parse::<NodeKind>().unwrap(), NodeKind::Delay);
        assert!(matches!(
            "teleport".parse::<NodeKind>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_custom_kind_resolves_builtin_names() {
        assert_eq!(NodeKind::custom("end"), NodeKind::End);
        assert_eq!(NodeKind::custom("webhook"), NodeKind::Custom("webhook".into()));
        assert_eq!(NodeKind::custom("webhook").to_string(), "webhook");
    }

    #[test]
    fn test_add_node_generates_id() {
        let mut workflow = Workflow::new("demo");
        let id = workflow
            .add_node(NodeKind::Delay, config(json!({ "duration_ms": 5 })))
            .unwrap();

        assert!(id.starts_with("delay_"));
        assert_eq!(workflow.node(&id).unwrap().kind, NodeKind::Delay);
    }

    #[test]
    fn test_add_node_missing_required_key() {
        let mut workflow = Workflow::new("demo");
        let result = workflow.add_node(
            NodeKind::ApiCall,
            config(json!({ "method": "GET", "url": "http://x" })),
        );

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
        assert_eq!(workflow.len(), 1);
    }

    #[test]
    fn test_add_node_rejects_wrong_type() {
        let mut workflow = Workflow::new("demo");
        let result = workflow.add_node(NodeKind::Delay, config(json!({ "duration_ms": "soon" })));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut workflow = Workflow::new("demo");
        let api = |timeout: u64| {
            config(json!({ "method": "GET", "url": "http://x", "timeout_seconds": timeout }))
        };

        let err = workflow.add_node(NodeKind::ApiCall, api(0)).unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
        assert!(workflow.add_node(NodeKind::ApiCall, api(1)).is_ok());
    }

    #[test]
    fn test_node_ids_kept_verbatim() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new(" a ", NodeKind::End)).unwrap();
        assert!(workflow.node(" a ").is_some());
        assert!(workflow.node("a").is_none());
        workflow.add_edge("start", " a ", None, false).unwrap();
        assert!(workflow.insert_node(Node::new("  ", NodeKind::End)).is_err());

        // A loaded id matches the same string the editing operations use.
        let loaded: Node = serde_json::from_value(json!({ "id": " b ", "kind": "end" })).unwrap();
        assert_eq!(loaded.id, Node::new(" b ", NodeKind::End).id);
    }

    #[test]
    fn test_second_start_rejected() {
        let mut workflow = Workflow::new("demo");
        assert!(workflow.add_node(NodeKind::Start, Config::new()).is_err());
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("a", NodeKind::End)).unwrap();
        assert!(workflow.insert_node(Node::new("a", NodeKind::End)).is_err());
    }

    #[test]
    fn test_add_edge_unknown_endpoint() {
        let mut workflow = Workflow::new("demo");
        let result = workflow.add_edge("start", "ghost", None, false);
        assert!(result.unwrap_err().to_string().contains("ghost"));
    }

    #[test]
    fn test_self_loop_requires_opt_in() {
        let mut workflow = Workflow::new("demo");
        assert!(workflow.add_edge("start", "start", None, false).is_err());
        assert!(workflow.add_edge("start", "start", None, true).is_ok());
    }

    #[test]
    fn test_edge_label_restricted() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("done", NodeKind::End)).unwrap();
        assert!(workflow.add_edge("start", "done", Some("maybe"), false).is_err());
        assert!(workflow.add_edge("start", "done", Some("true"), false).is_ok());
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("done", NodeKind::End)).unwrap();
        workflow.add_edge("start", "done", None, false).unwrap();
        assert!(workflow.add_edge("start", "done", None, false).is_err());
    }

    #[test]
    fn test_remove_node_removes_edges() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("mid", NodeKind::End)).unwrap();
        workflow.insert_node(Node::new("other", NodeKind::End)).unwrap();
        workflow.add_edge("start", "mid", None, false).unwrap();
        workflow.add_edge("start", "other", None, false).unwrap();

        workflow.remove_node("mid").unwrap();

        assert_eq!(workflow.edges.len(), 1);
        assert_eq!(workflow.edges[0].target, "other");
        assert!(workflow.remove_node("mid").is_err());
    }

    #[test]
    fn test_update_config_validates() {
        let mut workflow = Workflow::new("demo");
        let id = workflow
            .add_node(NodeKind::Decision, config(json!({ "condition": "x > 1" })))
            .unwrap();

        assert!(workflow.update_config(&id, Config::new()).is_err());
        assert_eq!(workflow.node(&id).unwrap().config_str("condition"), Some("x > 1"));

        workflow
            .update_config(&id, config(json!({ "condition": "x < 1" })))
            .unwrap();
        assert_eq!(workflow.node(&id).unwrap().config_str("condition"), Some("x < 1"));
    }

    #[test]
    fn test_reachable_from_start() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("a", NodeKind::End)).unwrap();
        workflow.insert_node(Node::new("island", NodeKind::End)).unwrap();
        workflow.add_edge("start", "a", None, false).unwrap();

        let reachable = workflow.reachable_from_start();
        assert!(reachable.contains("start"));
        assert!(reachable.contains("a"));
        assert!(!reachable.contains("island"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut workflow = Workflow::with_id("wf-1", "demo");
        workflow
            .insert_node(Node::new("wait", NodeKind::Delay).with("duration_ms", 10).at(1.0, 2.0))
            .unwrap();
        workflow.add_edge("start", "wait", None, false).unwrap();

        let value = serde_json::to_value(&workflow).unwrap();
        assert_eq!(value["id"], "wf-1");
        assert_eq!(value["nodes"][1]["kind"], "delay");
        assert_eq!(value["nodes"][1]["position"]["y"], 2.0);
        assert_eq!(value["edges"][0]["source"], "start");
        assert!(value["edges"][0]["label"].is_null());
    }

    #[test]
    fn test_custom_kind_deserializes() {
        let node: Node = serde_json::from_value(json!({
            "id": "hook",
            "kind": "webhook"
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::Custom("webhook".into()));
        assert!(node.config.is_empty());
    }
}
