//! Template Context: variable bindings threaded through a pipeline
//!
//! A context is an immutable chain of frames. Binding a variable returns a
//! new context whose head frame points at the old one, so a nested
//! pipeline can read everything its parent bound while its own writes stay
//! invisible to the parent once it returns.
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::data_model::OutputKey;

pub const INPUT_KEY: &str = "@input";
pub const OPTIONS_KEY: &str = "@options";

/// Template data variables (`{{@index}}` inside `#each`, ...)
pub const TEMPLATE_DATA_NAMES: &[&str] = &["index", "key", "first", "last", "root", "level"];

/// Names an output key may not take: the seed keys and the template data
/// variables, which a template could not tell apart from a binding
pub const RESERVED_NAMES: &[&str] = &[
    "input", "options", "index", "key", "first", "last", "root", "level",
];

#[derive(Debug)]
struct Frame {
    bindings: BTreeMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    head: Option<Arc<Frame>>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context holding only the reserved seed keys
    pub fn seeded(input: Value, options: Value) -> Self {
        Self::new().with_all([(INPUT_KEY, input), (OPTIONS_KEY, options)])
    }

    /// New context with `key` bound on top of this one
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        self.with_all([(key.into(), value)])
    }

    pub fn with_all<K, I>(&self, bindings: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let bindings: BTreeMap<String, Value> =
            bindings.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if bindings.is_empty() {
            return self.clone();
        }
        Self {
            head: Some(Arc::new(Frame {
                bindings,
                parent: self.head.clone(),
            })),
        }
    }

    /// Bind a step output under `@key`
    pub fn with_output(&self, key: &OutputKey, value: Value) -> Self {
        self.with(key.context_key(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.bindings.get(key) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn input(&self) -> Option<&Value> {
        self.get(INPUT_KEY)
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        let mut keys = BTreeSet::new();
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            keys.extend(current.bindings.keys().map(String::as_str));
            frame = current.parent.as_deref();
        }
        keys
    }

    /// Number of frames in the chain
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_deref();
        }
        depth
    }

    /// Flatten into a JSON object, inner bindings shadowing outer ones
    pub fn to_value(&self) -> Value {
        let mut frames = Vec::new();
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            frames.push(current);
            frame = current.parent.as_deref();
        }

        let mut flat = Map::new();
        for current in frames.into_iter().rev() {
            for (key, value) in &current.bindings {
                flat.insert(key.clone(), value.clone());
            }
        }
        Value::Object(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seeded_context() {
        let ctx = TemplateContext::seeded(json!({ "msg": "hi" }), json!({}));
        assert_eq!(ctx.input(), Some(&json!({ "msg": "hi" })));
        assert!(ctx.contains_key(OPTIONS_KEY));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_child_writes_do_not_leak() {
        let parent = TemplateContext::seeded(json!(1), json!({}));
        let child = parent.with("@foo", json!(42));

        assert_eq!(child.get("@foo"), Some(&json!(42)));
        assert_eq!(child.get(INPUT_KEY), Some(&json!(1)));
        assert!(parent.get("@foo").is_none());
    }

    #[test]
    fn test_shadowing() {
        let ctx = TemplateContext::new()
            .with("@foo", json!(1))
            .with("@foo", json!(2));
        assert_eq!(ctx.get("@foo"), Some(&json!(2)));
        assert_eq!(ctx.to_value(), json!({ "@foo": 2 }));
        assert_eq!(ctx.keys().len(), 1);
    }

    #[test]
    fn test_with_output() {
        let key = OutputKey::new("out").unwrap();
        let ctx = TemplateContext::new().with_output(&key, json!("x"));
        assert_eq!(ctx.get("@out"), Some(&json!("x")));
    }

    #[test]
    fn test_empty_binding_reuses_frame() {
        let ctx = TemplateContext::new().with("@a", json!(1));
        let same = ctx.with_all(Vec::<(String, Value)>::new());
        assert_eq!(same.depth(), 1);
    }
}
