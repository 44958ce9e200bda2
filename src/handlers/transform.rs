//! Transform nodes: pure operations over the context.
//!
//! `operation` is either an operation name, with its parameters as sibling
//! config keys, or an object `{ "name": ..., <parameters> }`.
//!
//! | operation        | parameters                          | effect                                   |
//! |------------------|-------------------------------------|------------------------------------------|
//! | `json_parse`     | `source`, `target` (= source)       | parse a JSON string                      |
//! | `json_stringify` | `source`, `target` (= source)       | serialize a value to a JSON string       |
//! | `extract_field`  | `source`, `path`, `target`          | copy `source.path` into `target`         |
//! | `map_array`      | `source`, `field`, `target`         | collect `field` from each array element  |
//! | `set`            | `target`, `value`                   | assign a literal                         |
//!
//! `target` defaults to the node id where not stated otherwise.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeHandler, NodeResult};
use crate::execution::context::step_into;
use crate::execution::{ExecutionContext, NodeTrace};
use crate::workflow::Node;

/// Names accepted in `operation`.
pub const OPERATIONS: &[&str] = &["json_parse", "json_stringify", "extract_field", "map_array", "set"];

#[derive(Debug, Clone, PartialEq)]
enum Operation {
    JsonParse { source: String, target: String },
    JsonStringify { source: String, target: String },
    ExtractField { source: String, path: Option<String>, target: String },
    MapArray { source: String, field: String, target: String },
    Set { target: String, value: Value },
}

impl Operation {
    fn from_node(node: &Node) -> Result<Self, String> {
        let (name, params): (&str, &Map<String, Value>) = match node.config.get("operation") {
            Some(Value::String(name)) => (name.as_str(), &node.config),
            Some(Value::Object(object)) => {
                let name = object
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or("operation object requires a 'name'")?;
                (name, object)
            }
            _ => return Err("transform requires an 'operation'".into()),
        };

        let text = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
        let required = |key: &str| {
            text(key).ok_or_else(|| format!("operation '{}' requires '{}'", name, key))
        };
        let target_or = |fallback: &str| text("target").unwrap_or_else(|| fallback.to_string());

        match name {
            "json_parse" => {
                let source = required("source")?;
                Ok(Operation::JsonParse { target: target_or(&source), source })
            }
            "json_stringify" => {
                let source = required("source")?;
                Ok(Operation::JsonStringify { target: target_or(&source), source })
            }
            "extract_field" => Ok(Operation::ExtractField {
                source: required("source")?,
                path: text("path"),
                target: target_or(&node.id),
            }),
            "map_array" => Ok(Operation::MapArray {
                source: required("source")?,
                field: required("field")?,
                target: target_or(&node.id),
            }),
            "set" => Ok(Operation::Set {
                target: required("target")?,
                value: params.get("value").cloned().unwrap_or(Value::Null),
            }),
            other => Err(format!(
                "unknown operation '{}' (allowed: {})",
                other,
                OPERATIONS.join(", ")
            )),
        }
    }

    fn apply(&self, context: &mut ExecutionContext) -> Result<String, String> {
        match self {
            Operation::JsonParse { source, target } => {
                let raw = lookup(context, source)?
                    .as_str()
                    .ok_or_else(|| format!("'{}' is not a string", source))?;
                let parsed: Value = serde_json::from_str(raw)
                    .map_err(|e| format!("'{}' is not valid JSON: {}", source, e))?;
                context.set(target.clone(), parsed);
                Ok(format!("Parsed JSON from '{}' into '{}'", source, target))
            }
            Operation::JsonStringify { source, target } => {
                let text = lookup(context, source)?.to_string();
                context.set(target.clone(), Value::String(text));
                Ok(format!("Serialized '{}' into '{}'", source, target))
            }
            Operation::ExtractField { source, path, target } => {
                let full = match path {
                    Some(path) => format!("{}.{}", source, path),
                    None => source.clone(),
                };
                let value = lookup(context, &full)?.clone();
                context.set(target.clone(), value);
                Ok(format!("Extracted '{}' into '{}'", full, target))
            }
            Operation::MapArray { source, field, target } => {
                let items = lookup(context, source)?
                    .as_array()
                    .ok_or_else(|| format!("'{}' is not an array", source))?;

                let mapped = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        field
                            .split('.')
                            .try_fold(item, |value, segment| step_into(value, segment))
                            .cloned()
                            .ok_or_else(|| format!("element {} of '{}' has no '{}'", index, source, field))
                    })
                    .collect::<Result<Vec<Value>, String>>()?;

                let count = mapped.len();
                context.set(target.clone(), Value::Array(mapped));
                Ok(format!("Mapped {} elements of '{}' into '{}'", count, source, target))
            }
            Operation::Set { target, value } => {
                context.set(target.clone(), value.clone());
                Ok(format!("Set '{}'", target))
            }
        }
    }
}

fn lookup<'a>(context: &'a ExecutionContext, path: &str) -> Result<&'a Value, String> {
    context
        .lookup(path)
        .ok_or_else(|| format!("missing variable '{}'", path))
}

pub struct TransformHandler;

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn handle(&self, node: &Node, mut context: ExecutionContext, _trace: &NodeTrace) -> NodeResult {
        let result = Operation::from_node(node).and_then(|operation| operation.apply(&mut context));
        match result {
            Ok(message) => NodeResult::success(context, message),
            Err(reason) => NodeResult::failure(context, reason),
        }
    }
}
