//! Execution Context
//!
//! The variable mapping threaded through a run. Each path owns its own
//! copy: fan-out clones the context, and paths never write into each
//! other's variables.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable mapping from variable name to value.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ExecutionContext {
    vars: Map<String, Value>,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON value.
    ///
    /// Objects become the variable map; `null` yields an empty context and
    /// any other value is stored under `input`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(vars) => Self { vars },
            Value::Null => Self::new(),
            other => {
                let mut ctx = Self::new();
                ctx.set("input", other);
                ctx
            }
        }
    }

    /// Returns a top-level variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Looks up a dotted path such as `response.body.items.0.id`.
    ///
    /// Numeric segments index into arrays.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.vars.get(first)?;
        for segment in segments {
            current = step_into(current, segment)?;
        }
        Some(current)
    }

    /// Sets (or overwrites) a top-level variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Removes a top-level variable.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Copies every entry of `other` into this context, overwriting.
    pub fn merge(&mut self, other: Map<String, Value>) {
        self.vars.extend(other);
    }

    /// Returns true if the variable exists.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Returns the number of top-level variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if the context has no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns the context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.vars.clone())
    }

    /// Returns the underlying variable map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }
}

/// Follows one path segment into an object or array.
pub(crate) fn step_into<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(vars: Map<String, Value>) -> Self {
        Self { vars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_dotted_path() {
        let ctx = ExecutionContext::from_value(json!({
            "user": { "name": "ada", "roles": ["admin", "dev"] }
        }));

        assert_eq!(ctx.lookup("user.name"), Some(&json!("ada")));
        assert_eq!(ctx.lookup("user.roles.1"), Some(&json!("dev")));
        assert_eq!(ctx.lookup("user.roles.9"), None);
        assert_eq!(ctx.lookup("user.email"), None);
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn test_from_value_variants() {
        assert!(ExecutionContext::from_value(Value::Null).is_empty());
        let ctx = ExecutionContext::from_value(json!(42));
        assert_eq!(ctx.get("input"), Some(&json!(42)));
    }

    #[test]
    fn test_set_and_merge() {
        let mut ctx = ExecutionContext::new();
        ctx.set("a", json!(1));

        let mut other = Map::new();
        other.insert("a".into(), json!(2));
        other.insert("b".into(), json!(3));
        ctx.merge(other);

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("a"), Some(&json!(2)));
        assert_eq!(ctx.remove("b"), Some(json!(3)));
        assert!(!ctx.contains("b"));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = ExecutionContext::new();
        original.set("x", json!(1));
        let mut fork = original.clone();
        fork.set("x", json!(2));

        assert_eq!(original.get("x"), Some(&json!(1)));
        assert_eq!(fork.get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let ctx = ExecutionContext::from_value(json!({ "k": "v" }));
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({ "k": "v" }));
    }
}
