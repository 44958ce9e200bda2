//! HTTP call nodes.
//!
//! The handler speaks to a swappable [`HttpClient`]; [`ReqwestClient`] is
//! the production implementation and tests script their own.
//!
//! Config keys:
//! - `method`, `url`, `timeout_seconds` (required)
//! - `headers`: object of header values
//! - `body`: string, or any JSON value sent serialized
//! - `retries`: extra attempts after a failure (default 0)
//! - `output_key`: context key for the response (default: node id)
//!
//! `url`, header values and string bodies may reference context variables
//! as `{{path.to.value}}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};
use thiserror::Error;

use super::{NodeHandler, NodeResult};
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::Node;

/// A fully resolved outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// 2xx and 3xx count as success.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HttpError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Capability for issuing HTTP requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| HttpError::InvalidRequest(format!("method '{}': {}", request.method, e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(request.timeout)
            } else if e.is_builder() {
                HttpError::InvalidRequest(e.to_string())
            } else {
                HttpError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Connection(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}

/// Replaces `{{path}}` placeholders with context values.
///
/// Strings are inserted verbatim, other values as compact JSON. A
/// placeholder naming a missing variable is an error.
pub fn render_template(template: &str, context: &ExecutionContext) -> Result<String, String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        output.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| format!("unterminated placeholder in '{}'", template))?;

        let path = after[..close].trim();
        match context.lookup(path) {
            Some(Value::String(s)) => output.push_str(s),
            Some(other) => output.push_str(&other.to_string()),
            None => return Err(format!("missing variable '{}'", path)),
        }
        rest = &after[close + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Handler for `api_call` nodes.
pub struct ApiCallHandler {
    client: Arc<dyn HttpClient>,
}

impl ApiCallHandler {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    fn build_request(node: &Node, context: &ExecutionContext) -> Result<HttpRequest, String> {
        let method = node
            .config_str("method")
            .ok_or("api_call requires 'method'")?
            .to_uppercase();
        let url = node.config_str("url").ok_or("api_call requires 'url'")?;
        let timeout_seconds = node
            .config_u64("timeout_seconds")
            .filter(|&seconds| seconds >= 1)
            .ok_or("api_call requires 'timeout_seconds' of at least 1")?;

        let mut headers = BTreeMap::new();
        if let Some(map) = node.config.get("headers").and_then(Value::as_object) {
            for (key, value) in map {
                let raw = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                headers.insert(key.clone(), render_template(&raw, context)?);
            }
        }

        let body = match node.config.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(render_template(s, context)?),
            Some(other) => Some(other.to_string()),
        };

        Ok(HttpRequest {
            method,
            url: render_template(url, context)?,
            headers,
            body,
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        // Applies even to clients that ignore `request.timeout`.
        let response = tokio::time::timeout(request.timeout, self.client.send(request.clone()))
            .await
            .map_err(|_| HttpError::Timeout(request.timeout).to_string())?
            .map_err(|e| e.to_string())?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(format!(
                "HTTP {} from {} {}",
                response.status, request.method, request.url
            ))
        }
    }
}

#[async_trait]
impl NodeHandler for ApiCallHandler {
    async fn handle(&self, node: &Node, mut context: ExecutionContext, trace: &NodeTrace) -> NodeResult {
        let request = match Self::build_request(node, &context) {
            Ok(request) => request,
            Err(reason) => return NodeResult::failure(context, reason),
        };
        let retries = node.config_u64("retries").unwrap_or(0);
        let attempts = retries + 1;

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            debug!("Node '{}': {} {} (attempt {})", node.id, request.method, request.url, attempt);

            match self.attempt(&request).await {
                Ok(response) => {
                    let body = serde_json::from_str::<Value>(&response.body)
                        .unwrap_or_else(|_| Value::String(response.body.clone()));
                    let key = node.config_str("output_key").unwrap_or(&node.id).to_string();
                    context.set(key, json!({ "status": response.status, "body": body }));

                    return NodeResult::success(
                        context,
                        format!("{} {} -> {}", request.method, request.url, response.status),
                    );
                }
                Err(reason) => {
                    if attempt < attempts {
                        warn!("Node '{}' attempt {} failed: {}", node.id, attempt, reason);
                        trace.info(format!(
                            "Attempt {}/{} failed: {}; retrying",
                            attempt, attempts, reason
                        ));
                    }
                    last_error = reason;
                }
            }
        }

        NodeResult::failure(context, last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Outcome;
    use crate::workflow::NodeKind;
    use std::sync::Mutex;

    /// Returns scripted responses in order and records requests.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(HttpError::Connection("script exhausted".into())))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl HttpClient for SlowClient {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, HttpError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(HttpResponse { status: 200, body: String::new() })
        }
    }

    fn ok(status: u16, body: &str) -> Result<HttpResponse, HttpError> {
        Ok(HttpResponse { status, body: body.to_string() })
    }

    fn api_node() -> Node {
        Node::new("fetch", NodeKind::ApiCall)
            .with("method", "get")
            .with("url", "http://api.test/items/{{item.id}}")
            .with("timeout_seconds", 5)
    }

    fn context() -> ExecutionContext {
        ExecutionContext::from_value(json!({ "item": { "id": 7 } }))
    }

    #[tokio::test]
    async fn test_success_merges_response() {
        let client = ScriptedClient::new(vec![ok(200, r#"{"name":"widget"}"#)]);
        let handler = ApiCallHandler::new(client.clone());
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&api_node(), context(), &trace).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.context.lookup("fetch.status"), Some(&json!(200)));
        assert_eq!(result.context.lookup("fetch.body.name"), Some(&json!("widget")));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].url, "http://api.test/items/7");
    }

    #[tokio::test]
    async fn test_redirect_status_is_success() {
        let client = ScriptedClient::new(vec![ok(302, "moved")]);
        let handler = ApiCallHandler::new(client);
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&api_node(), context(), &trace).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.context.lookup("fetch.body"), Some(&json!("moved")));
    }

    #[tokio::test]
    async fn test_server_error_fails_with_status() {
        let client = ScriptedClient::new(vec![ok(500, "oops")]);
        let handler = ApiCallHandler::new(client);
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&api_node(), context(), &trace).await;

        match result.outcome {
            Outcome::Failure(reason) => assert!(reason.contains("500")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(trace.entries().is_empty());
    }

    #[tokio::test]
    async fn test_retries_are_logged() {
        let client = ScriptedClient::new(vec![
            ok(503, ""),
            Err(HttpError::Connection("reset".into())),
            ok(201, "{}"),
        ]);
        let handler = ApiCallHandler::new(client.clone());
        let node = api_node().with("retries", 2).with("output_key", "created");
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&node, context(), &trace).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert!(result.context.contains("created"));
        assert_eq!(client.requests.lock().unwrap().len(), 3);

        let entries = trace.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.contains("Attempt 1/3"));
        assert!(entries[1].message.contains("reset"));
    }

    #[tokio::test]
    async fn test_timeout_enforced_by_handler() {
        let handler = ApiCallHandler::new(Arc::new(SlowClient));
        let node = api_node().with("timeout_seconds", 1);
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&node, context(), &trace).await;
        match result.outcome {
            Outcome::Failure(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_without_request() {
        let client = ScriptedClient::new(vec![]);
        let handler = ApiCallHandler::new(client.clone());
        let node = api_node().with("timeout_seconds", 0);
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&node, context(), &trace).await;
        match result.outcome {
            Outcome::Failure(reason) => assert!(reason.contains("at least 1")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_template_variable_fails() {
        let client = ScriptedClient::new(vec![]);
        let handler = ApiCallHandler::new(client.clone());
        let trace = NodeTrace::detached("fetch", &NodeKind::ApiCall);

        let result = handler.handle(&api_node(), ExecutionContext::new(), &trace).await;

        assert!(result.outcome.is_failure());
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_render_template() {
        let ctx = ExecutionContext::from_value(json!({ "user": { "name": "ada", "age": 36 } }));
        assert_eq!(
            render_template("hi {{ user.name }} ({{user.age}})", &ctx).unwrap(),
            "hi ada (36)"
        );
        assert_eq!(render_template("plain", &ctx).unwrap(), "plain");
        assert!(render_template("{{nobody}}", &ctx).is_err());
        assert!(render_template("{{user.name", &ctx).is_err());
    }

    #[test]
    fn test_build_request_body_and_headers() {
        let node = api_node()
            .with("method", "POST")
            .with("headers", json!({ "X-Item": "{{item.id}}", "X-Count": 2 }))
            .with("body", json!({ "a": 1 }));

        let request = ApiCallHandler::build_request(&node, &context()).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("X-Item").unwrap(), "7");
        assert_eq!(request.headers.get("X-Count").unwrap(), "2");
        assert_eq!(request.body.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(request.timeout, Duration::from_secs(5));
    }
}
