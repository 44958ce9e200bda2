//! Start, end and delay nodes.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::{NodeHandler, NodeResult};
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::Node;

/// Entry marker. Always succeeds.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    async fn handle(&self, _node: &Node, context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        NodeResult::success(context, "Workflow started")
    }
}

/// Terminal marker. Always succeeds; the path ends here.
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    async fn handle(&self, _node: &Node, context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        NodeResult::success(context, "Workflow reached end")
    }
}

/// Suspends the current path for `duration_ms` without blocking others.
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn handle(&self, node: &Node, context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        let Some(duration_ms) = node.config_u64("duration_ms") else {
            return NodeResult::failure(context, "delay requires a non-negative integer 'duration_ms'");
        };

        debug!("Node '{}' sleeping for {} ms", node.id, duration_ms);
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        NodeResult::success(context, format!("Waited {} ms", duration_ms))
    }
}
