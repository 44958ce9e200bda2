//! Node Handlers
//!
//! Maps a node's kind to the behavior that executes it. The engine only
//! knows the [`NodeHandler`] contract, so new kinds are added by
//! registering a handler, never by touching the engine.
//!
//! # Built-in kinds
//!
//! - [`control`]: `start`, `end` and `delay`
//! - [`http`]: `api_call`, over a swappable [`HttpClient`](http::HttpClient)
//! - [`decision`]: `decision`, using the [`condition`] grammar
//! - [`transform`]: `transform`, from a fixed allow-list of operations
//! - [`ai`]: `ai_task`, over a swappable [`AiTask`](ai::AiTask)

pub mod ai;
pub mod condition;
pub mod control;
pub mod decision;
pub mod http;
pub mod transform;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::model::{LABEL_FALSE, LABEL_TRUE};
use crate::workflow::{Node, NodeKind};

pub use ai::{AiTask, AiTaskHandler, UnconfiguredAi};
pub use http::{ApiCallHandler, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestClient};

/// What a handler decided about the node it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
    /// Follow only the outgoing edges labeled `"true"` or `"false"`.
    Branch(bool),
}

impl Outcome {
    /// The edge label selected by a branch outcome.
    pub fn branch_label(&self) -> Option<&'static str> {
        match self {
            Outcome::Branch(true) => Some(LABEL_TRUE),
            Outcome::Branch(false) => Some(LABEL_FALSE),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }
}

/// The result of running one node: the updated context, the outcome and
/// a human-readable message for the trace.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub context: ExecutionContext,
    pub outcome: Outcome,
    pub message: String,
}

impl NodeResult {
    pub fn success(context: ExecutionContext, message: impl Into<String>) -> Self {
        Self {
            context,
            outcome: Outcome::Success,
            message: message.into(),
        }
    }

    pub fn failure(context: ExecutionContext, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            context,
            message: reason.clone(),
            outcome: Outcome::Failure(reason),
        }
    }

    pub fn branch(context: ExecutionContext, taken: bool, message: impl Into<String>) -> Self {
        Self {
            context,
            outcome: Outcome::Branch(taken),
            message: message.into(),
        }
    }
}

/// Behavior executing one kind of node.
///
/// Handlers receive their own copy of the path's context and return the
/// updated copy; they never see other paths' variables.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, node: &Node, context: ExecutionContext, trace: &NodeTrace) -> NodeResult;
}

/// Adapts a plain synchronous function into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(&Node, ExecutionContext) -> NodeResult + Send + Sync,
{
    async fn handle(&self, node: &Node, context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        (self.0)(node, context)
    }
}

/// Registry of handlers keyed by node kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in kind registered.
    pub fn builtin(
        http: Arc<dyn HttpClient>,
        ai: Arc<dyn AiTask>,
        config: &EngineConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(NodeKind::Start, control::StartHandler);
        registry.register(NodeKind::End, control::EndHandler);
        registry.register(NodeKind::Delay, control::DelayHandler);
        registry.register(NodeKind::ApiCall, ApiCallHandler::new(http));
        registry.register(NodeKind::Decision, decision::DecisionHandler);
        registry.register(NodeKind::Transform, transform::TransformHandler);
        registry.register(
            NodeKind::AiTask,
            AiTaskHandler::new(ai).with_default_timeout(config.ai_timeout()),
        );
        registry
    }

    /// Registers (or replaces) the handler for a kind.
    pub fn register(&mut self, kind: NodeKind, handler: impl NodeHandler + 'static) {
        self.handlers.insert(kind, Arc::new(handler));
    }

    /// Registers a synchronous function as the handler for a kind.
    pub fn register_fn<F>(&mut self, kind: NodeKind, handler: F)
    where
        F: Fn(&Node, ExecutionContext) -> NodeResult + Send + Sync + 'static,
    {
        self.register(kind, FnHandler(handler));
    }

    /// Gets the handler for a kind.
    pub fn get(&self, kind: &NodeKind) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Returns every registered kind, sorted by name.
    pub fn kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<NodeKind> = self.handlers.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
