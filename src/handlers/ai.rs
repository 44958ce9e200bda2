//! AI task nodes.
//!
//! The model behind an `ai_task` is an opaque [`AiTask`] capability; this
//! module only selects the input, enforces the timeout and stores the
//! result under `output_key` (default: node id).
//!
//! Config keys: `model`, `instruction` (required, `instruction` may use
//! `{{path}}` placeholders), `inputs` (list of context paths to send;
//! default the whole context), `timeout_seconds`, `output_key`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};

use super::http::render_template;
use super::{NodeHandler, NodeResult};
use crate::config::DEFAULT_AI_TIMEOUT_SECONDS;
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::Node;

/// Capability that runs an instruction against a model.
#[async_trait]
pub trait AiTask: Send + Sync {
    async fn run(&self, model: &str, instruction: &str, context: &Value) -> Result<Value, String>;
}

/// Placeholder capability for deployments without an AI backend.
pub struct UnconfiguredAi;

#[async_trait]
impl AiTask for UnconfiguredAi {
    async fn run(&self, model: &str, _instruction: &str, _context: &Value) -> Result<Value, String> {
        Err(format!("no AI capability configured for model '{}'", model))
    }
}

/// Handler for `ai_task` nodes.
pub struct AiTaskHandler {
    ai: Arc<dyn AiTask>,
    default_timeout: Duration,
}

impl AiTaskHandler {
    pub fn new(ai: Arc<dyn AiTask>) -> Self {
        Self {
            ai,
            default_timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECONDS),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The part of the context sent to the model.
    fn select_inputs(node: &Node, context: &ExecutionContext) -> Result<Value, String> {
        let Some(inputs) = node.config.get("inputs").and_then(Value::as_array) else {
            return Ok(context.to_value());
        };

        let mut selected = Map::new();
        for input in inputs {
            let path = input
                .as_str()
                .ok_or_else(|| format!("'inputs' entries must be strings, got {}", input))?;
            let value = context
                .lookup(path)
                .ok_or_else(|| format!("missing variable '{}'", path))?;
            selected.insert(path.to_string(), value.clone());
        }
        Ok(Value::Object(selected))
    }
}

#[async_trait]
impl NodeHandler for AiTaskHandler {
    async fn handle(&self, node: &Node, mut context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        let (Some(model), Some(instruction)) = (node.config_str("model"), node.config_str("instruction"))
        else {
            return NodeResult::failure(context, "ai_task requires 'model' and 'instruction'");
        };

        let prepared = render_template(instruction, &context)
            .and_then(|instruction| Ok((instruction, Self::select_inputs(node, &context)?)));
        let (instruction, inputs) = match prepared {
            Ok(prepared) => prepared,
            Err(reason) => return NodeResult::failure(context, reason),
        };

        let timeout = node
            .config_u64("timeout_seconds")
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        debug!("Node '{}': delegating to model '{}' (timeout {:?})", node.id, model, timeout);

        match tokio::time::timeout(timeout, self.ai.run(model, &instruction, &inputs)).await {
            Err(_) => NodeResult::failure(context, format!("AI task timed out after {:?}", timeout)),
            Ok(Err(e)) => NodeResult::failure(context, format!("AI task failed: {}", e)),
            Ok(Ok(result)) => {
                let key = node.config_str("output_key").unwrap_or(&node.id).to_string();
                context.set(key.clone(), result);
                NodeResult::success(context, format!("Model '{}' result stored in '{}'", model, key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Outcome;
    use crate::workflow::NodeKind;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls and answers with a fixed value.
    struct EchoAi {
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl AiTask for EchoAi {
        async fn run(&self, model: &str, instruction: &str, context: &Value) -> Result<Value, String> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), instruction.to_string(), context.clone()));
            Ok(json!({ "summary": "short" }))
        }
    }

    struct StuckAi;

    #[async_trait]
    impl AiTask for StuckAi {
        async fn run(&self, _model: &str, _instruction: &str, _context: &Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    fn ai_node() -> Node {
        Node::new("summarize", NodeKind::AiTask)
            .with("model", "small")
            .with("instruction", "Summarize {{doc.title}}")
    }

    fn context() -> ExecutionContext {
        ExecutionContext::from_value(json!({ "doc": { "title": "Report" }, "secret": "x" }))
    }

    #[tokio::test]
    async fn test_result_merged_into_context() {
        let ai = Arc::new(EchoAi { calls: Mutex::new(Vec::new()) });
        let handler = AiTaskHandler::new(ai.clone());
        let node = ai_node().with("inputs", json!(["doc.title"]));
        let trace = NodeTrace::detached("summarize", &NodeKind::AiTask);

        let result = handler.handle(&node, context(), &trace).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.context.lookup("summarize.summary"), Some(&json!("short")));

        let calls = ai.calls.lock().unwrap();
        assert_eq!(calls[0].0, "small");
        assert_eq!(calls[0].1, "Summarize Report");
        assert_eq!(calls[0].2, json!({ "doc.title": "Report" }));
    }

    #[tokio::test]
    async fn test_unconfigured_fails() {
        let handler = AiTaskHandler::new(Arc::new(UnconfiguredAi));
        let trace = NodeTrace::detached("summarize", &NodeKind::AiTask);

        let result = handler.handle(&ai_node(), context(), &trace).await;
        match result.outcome {
            Outcome::Failure(reason) => assert!(reason.contains("no AI capability")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let handler = AiTaskHandler::new(Arc::new(StuckAi)).with_default_timeout(Duration::from_millis(20));
        let trace = NodeTrace::detached("summarize", &NodeKind::AiTask);

        let result = handler.handle(&ai_node(), context(), &trace).await;
        assert!(result.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let handler = AiTaskHandler::new(Arc::new(UnconfiguredAi));
        let node = ai_node().with("inputs", json!(["nothing"]));
        let trace = NodeTrace::detached("summarize", &NodeKind::AiTask);

        let result = handler.handle(&node, context(), &trace).await;
        assert!(result.message.contains("missing variable 'nothing'"));
    }
}
