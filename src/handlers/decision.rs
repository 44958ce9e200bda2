//! Decision nodes: evaluate `condition` and pick the `"true"` or `"false"` edge.

use async_trait::async_trait;
use log::debug;

use super::condition::Condition;
use super::{NodeHandler, NodeResult};
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::Node;

pub struct DecisionHandler;

#[async_trait]
impl NodeHandler for DecisionHandler {
    async fn handle(&self, node: &Node, context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        let Some(source) = node.config_str("condition") else {
            return NodeResult::failure(context, "decision requires a 'condition' string");
        };

        let result = Condition::parse(source).and_then(|condition| condition.evaluate(&context));
        match result {
            Ok(taken) => {
                debug!("Node '{}': '{}' -> {}", node.id, source, taken);
                NodeResult::branch(context, taken, format!("Condition '{}' evaluated to {}", source, taken))
            }
            Err(e) => NodeResult::failure(context, format!("Condition '{}' failed: {}", source, e)),
        }
    }
}
