//! Workflow Validation
//!
//! Two levels of checking:
//! - [`validate`]: non-fatal issues surfaced to the editor (unreachable
//!   nodes, missing decision branches, unguarded cycles, ...)
//! - [`check_runnable`]: structural preconditions that must hold before a
//!   run may start (exactly one start node, no dangling edges, unique ids)

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info};

use super::model::{validate_config, NodeKind, Workflow, LABEL_FALSE, LABEL_TRUE};
use crate::error::{Error, Result};

/// A problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    MissingStart,
    MultipleStarts(usize),
    DuplicateNodeId(String),
    DanglingEdge { edge: String, endpoint: String },
    Unreachable(String),
    MissingBranch { node: String, label: &'static str },
    UnlabeledDecisionEdge { node: String, edge: String },
    UnguardedCycle(Vec<String>),
    InvalidConfig { node: String, reason: String },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStart => write!(f, "Workflow has no start node"),
            Self::MultipleStarts(count) => {
                write!(f, "Workflow has {} start nodes (exactly one allowed)", count)
            }
            Self::DuplicateNodeId(id) => write!(f, "Duplicate node ID: '{}'", id),
            Self::DanglingEdge { edge, endpoint } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge, endpoint)
            }
            Self::Unreachable(id) => write!(f, "Node '{}' is unreachable from start", id),
            Self::MissingBranch { node, label } => {
                write!(f, "Decision node '{}' has no '{}' edge", node, label)
            }
            Self::UnlabeledDecisionEdge { node, edge } => write!(
                f,
                "Decision node '{}' has unlabeled edge '{}' that will never be taken",
                node, edge
            ),
            Self::UnguardedCycle(nodes) => write!(
                f,
                "Cycle detected with no delay/guard: {}",
                nodes.join(" -> ")
            ),
            Self::InvalidConfig { node, reason } => {
                write!(f, "Node '{}': {}", node, reason)
            }
        }
    }
}

/// Checks a workflow and returns every issue found. Never fails.
pub fn validate(workflow: &Workflow) -> Vec<Issue> {
    let mut issues = structural_issues(workflow);

    for node in &workflow.nodes {
        if let Err(Error::Validation(reason)) = validate_config(&node.kind, &node.config) {
            issues.push(Issue::InvalidConfig {
                node: node.id.clone(),
                reason,
            });
        }
    }

    if workflow.start_node().is_some() {
        let reachable = workflow.reachable_from_start();
        for node in &workflow.nodes {
            if !reachable.contains(&node.id) {
                debug!("Node '{}' is inert (unreachable)", node.id);
                issues.push(Issue::Unreachable(node.id.clone()));
            }
        }
    }

    for node in workflow.nodes.iter().filter(|n| n.kind == NodeKind::Decision) {
        for label in [LABEL_TRUE, LABEL_FALSE] {
            if !workflow
                .outgoing(&node.id)
                .any(|e| e.label.as_deref() == Some(label))
            {
                issues.push(Issue::MissingBranch {
                    node: node.id.clone(),
                    label,
                });
            }
        }
        for edge in workflow.outgoing(&node.id).filter(|e| e.label.is_none()) {
            issues.push(Issue::UnlabeledDecisionEdge {
                node: node.id.clone(),
                edge: edge.id.clone(),
            });
        }
    }

    let cycle = unguarded_cycle_nodes(workflow);
    if !cycle.is_empty() {
        issues.push(Issue::UnguardedCycle(cycle));
    }

    info!(
        "Validated workflow '{}': {} nodes, {} edges, {} issues",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len(),
        issues.len()
    );
    issues
}

/// Fails with [`Error::Structural`] if the workflow cannot run at all.
pub fn check_runnable(workflow: &Workflow) -> Result<()> {
    let issues = structural_issues(workflow);
    if issues.is_empty() {
        return Ok(());
    }

    let messages: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    Err(Error::structural(messages.join("; ")))
}

/// Issues that make a workflow impossible to run.
fn structural_issues(workflow: &Workflow) -> Vec<Issue> {
    let mut issues = Vec::new();

    match workflow.start_nodes().len() {
        0 => issues.push(Issue::MissingStart),
        1 => {}
        count => issues.push(Issue::MultipleStarts(count)),
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !ids.insert(node.id.as_str()) {
            issues.push(Issue::DuplicateNodeId(node.id.clone()));
        }
    }

    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                issues.push(Issue::DanglingEdge {
                    edge: edge.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
    }

    issues
}

/// Returns the sorted ids of nodes lying on a cycle that passes through no
/// `delay` or `decision` node.
///
/// A node is on an unguarded cycle if it can reach itself while only
/// stepping through unguarded nodes.
fn unguarded_cycle_nodes(workflow: &Workflow) -> Vec<String> {
    let unguarded: HashSet<&str> = workflow
        .nodes
        .iter()
        .filter(|n| !matches!(n.kind, NodeKind::Delay | NodeKind::Decision))
        .map(|n| n.id.as_str())
        .collect();

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        if unguarded.contains(edge.source.as_str()) && unguarded.contains(edge.target.as_str()) {
            successors
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut on_cycle: Vec<String> = unguarded
        .iter()
        .filter(|id| reaches_itself(id, &successors))
        .map(|id| id.to_string())
        .collect();
    on_cycle.sort();
    on_cycle
}

fn reaches_itself(origin: &str, successors: &HashMap<&str, Vec<&str>>) -> bool {
    let mut stack: Vec<&str> = successors.get(origin).cloned().unwrap_or_default();
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == origin {
            return true;
        }
        if seen.insert(current) {
            if let Some(next) = successors.get(current) {
                stack.extend(next.iter().copied());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Edge, Node};

    fn decision(id: &str) -> Node {
        Node::new(id, NodeKind::Decision).with("condition", "x > 1")
    }

    #[test]
    fn test_fresh_workflow_is_clean() {
        let workflow = Workflow::new("demo");
        assert!(validate(&workflow).is_empty());
        assert!(check_runnable(&workflow).is_ok());
    }

    #[test]
    fn test_unreachable_node_reported() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(Node::new("island", NodeKind::End)).unwrap();

        let issues = validate(&workflow);
        assert!(issues.contains(&Issue::Unreachable("island".into())));
        assert!(check_runnable(&workflow).is_ok());
    }

    #[test]
    fn test_decision_missing_false_edge() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(decision("check")).unwrap();
        workflow.insert_node(Node::new("yes", NodeKind::End)).unwrap();
        workflow.add_edge("start", "check", None, false).unwrap();
        workflow.add_edge("check", "yes", Some("true"), false).unwrap();

        let issues = validate(&workflow);
        assert!(issues.contains(&Issue::MissingBranch {
            node: "check".into(),
            label: "false"
        }));
        assert!(!issues.iter().any(|i| matches!(i, Issue::MissingBranch { label: "true", .. })));
    }

    #[test]
    fn test_unlabeled_decision_edge() {
        let mut workflow = Workflow::new("demo");
        workflow.insert_node(decision("check")).unwrap();
        workflow.insert_node(Node::new("next", NodeKind::End)).unwrap();
        workflow.add_edge("start", "check", None, false).unwrap();
        workflow.add_edge("check", "next", None, false).unwrap();

        let issues = validate(&workflow);
        assert!(issues
            .iter()
            .any(|i| matches!(i, Issue::UnlabeledDecisionEdge { node, .. } if node == "check")));
    }

    #[test]
    fn test_unguarded_cycle_detected() {
        let mut workflow = Workflow::new("demo");
        workflow
            .insert_node(Node::new("a", NodeKind::Transform).with("operation", "set"))
            .unwrap();
        workflow
            .insert_node(Node::new("b", NodeKind::Transform).with("operation", "set"))
            .unwrap();
        workflow.add_edge("start", "a", None, false).unwrap();
        workflow.add_edge("a", "b", None, false).unwrap();
        workflow.add_edge("b", "a", None, false).unwrap();

        let issues = validate(&workflow);
        assert!(issues.contains(&Issue::UnguardedCycle(vec!["a".into(), "b".into()])));
    }

    #[test]
    fn test_cycle_through_delay_is_guarded() {
        let mut workflow = Workflow::new("demo");
        workflow
            .insert_node(Node::new("a", NodeKind::Transform).with("operation", "set"))
            .unwrap();
        workflow
            .insert_node(Node::new("wait", NodeKind::Delay).with("duration_ms", 100))
            .unwrap();
        workflow.add_edge("start", "a", None, false).unwrap();
        workflow.add_edge("a", "wait", None, false).unwrap();
        workflow.add_edge("wait", "a", None, false).unwrap();

        let issues = validate(&workflow);
        assert!(!issues.iter().any(|i| matches!(i, Issue::UnguardedCycle(_))));
    }

    #[test]
    fn test_self_loop_is_unguarded_cycle() {
        let mut workflow = Workflow::new("demo");
        workflow
            .insert_node(Node::new("spin", NodeKind::Transform).with("operation", "set"))
            .unwrap();
        workflow.add_edge("start", "spin", None, false).unwrap();
        workflow.add_edge("spin", "spin", None, true).unwrap();

        let issues = validate(&workflow);
        assert!(issues.contains(&Issue::UnguardedCycle(vec!["spin".into()])));
    }

    #[test]
    fn test_missing_start_is_structural() {
        let mut workflow = Workflow::new("demo");
        workflow.remove_node("start").unwrap();

        assert!(validate(&workflow).contains(&Issue::MissingStart));
        let err = check_runnable(&workflow).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn test_duplicate_start_is_structural() {
        let mut workflow = Workflow::new("demo");
        workflow.nodes.push(Node::new("start2", NodeKind::Start));

        let err = check_runnable(&workflow).unwrap_err();
        assert!(err.to_string().contains("2 start nodes"));
    }

    #[test]
    fn test_dangling_edge_is_structural() {
        let mut workflow = Workflow::new("demo");
        workflow.edges.push(Edge {
            id: "e1".into(),
            source: "start".into(),
            target: "ghost".into(),
            label: None,
        });

        let err = check_runnable(&workflow).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_invalid_config_reported() {
        let mut workflow = Workflow::new("demo");
        workflow.nodes.push(Node::new("wait", NodeKind::Delay));
        workflow.add_edge("start", "wait", None, false).unwrap();

        let issues = validate(&workflow);
        assert!(issues
            .iter()
            .any(|i| matches!(i, Issue::InvalidConfig { node, .. } if node == "wait")));
    }

    #[test]
    fn test_issue_display() {
        assert_eq!(Issue::MissingStart.to_string(), "Workflow has no start node");
        assert!(Issue::Unreachable("x".into()).to_string().contains("unreachable"));
        assert!(Issue::UnguardedCycle(vec!["a".into()])
            .to_string()
            .contains("no delay/guard"));
    }
}
