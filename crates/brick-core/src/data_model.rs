//! Data Model: BrickConfig, Pipeline, Expression, Branch
//!
//! These types are the wire format of a mod definition. They must
//! round-trip through (de)serialization without changing shape, so every
//! optional field is omitted when absent.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::context::RESERVED_NAMES;
use crate::error::{ExpressionError, PipelineError};

/// Unique per step occurrence; join key for trace records.
pub type InstanceId = Uuid;

/// Identifies one top-level pipeline invocation.
pub type RunId = Uuid;

static OUTPUT_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][\dA-Za-z]*$").expect("output key pattern"));

/// Registry id of a brick (ex: "@brickflow/retry")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrickId(String);

impl BrickId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BrickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BrickId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BrickId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Name under which a step's output is bound for later steps.
///
/// Validated on construction: `^[A-Za-z][\dA-Za-z]*$` and not one of the
/// reserved context names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputKey(String);

impl OutputKey {
    pub fn new(key: impl Into<String>) -> Result<Self, PipelineError> {
        let key = key.into();
        if !OUTPUT_KEY_PATTERN.is_match(&key) {
            return Err(PipelineError::InvalidPipeline(format!(
                "output key '{}' must start with a letter and contain only letters and digits",
                key
            )));
        }
        if RESERVED_NAMES.contains(&key.as_str()) {
            return Err(PipelineError::InvalidPipeline(format!(
                "output key '{}' collides with a reserved context key",
                key
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The context variable this key binds, ex: `@foo`
    pub fn context_key(&self) -> String {
        format!("@{}", self.0)
    }
}

impl TryFrom<String> for OutputKey {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OutputKey::new(value)
    }
}

impl From<OutputKey> for String {
    fn from(key: OutputKey) -> Self {
        key.0
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame a step should run in. Only carried through to the brick; the
/// runtime itself always executes in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    #[serde(rename = "self")]
    Current,
    Opener,
    Target,
    Top,
    Broadcast,
}

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickConfig {
    /// Registry id of the brick to run
    pub id: BrickId,
    /// Arguments, possibly containing expressions at any depth
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<OutputKey>,
    /// Run condition (literal or expression)
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Target>,
    /// Assigned on load when a legacy definition omits it
    #[serde(default = "Uuid::new_v4")]
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl BrickConfig {
    pub fn new(id: impl Into<BrickId>, config: Value) -> Self {
        Self {
            id: id.into(),
            config,
            output_key: None,
            condition: None,
            window: None,
            instance_id: Uuid::new_v4(),
            label: None,
        }
    }

    pub fn with_output_key(mut self, key: OutputKey) -> Self {
        self.output_key = Some(key);
        self
    }

    /// Bind the output under `@key`
    pub fn try_output_key(self, key: &str) -> Result<Self, PipelineError> {
        Ok(self.with_output_key(OutputKey::new(key)?))
    }

    pub fn when(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_instance_id(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn target(&self) -> Target {
        self.window.unwrap_or_default()
    }
}

/// Ordered list of steps. Later steps see earlier steps' output keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline(Vec<BrickConfig>);

impl Pipeline {
    pub fn new(steps: Vec<BrickConfig>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[BrickConfig] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BrickConfig> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every step in a single pipeline needs its own instance id.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut seen = HashSet::new();
        for step in &self.0 {
            if !seen.insert(step.instance_id) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "duplicate instance id {} ({})",
                    step.instance_id, step.id
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<BrickConfig>> for Pipeline {
    fn from(steps: Vec<BrickConfig>) -> Self {
        Self(steps)
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a BrickConfig;
    type IntoIter = std::slice::Iter<'a, BrickConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub const TYPE_KEY: &str = "__type__";
pub const VALUE_KEY: &str = "__value__";

/// Tags recognised as expressions. Objects with any other `__type__` are data.
pub const EXPRESSION_TYPES: &[&str] = &["var", "nunjucks", "handlebars", "pipeline", "defer"];

/// Deferred-evaluation value embedded in brick config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type__", content = "__value__", rename_all = "lowercase")]
pub enum Expression {
    /// Dotted path into the context, ex: `@input.msg`
    Var(String),
    Nunjucks(String),
    Handlebars(String),
    /// Nested pipeline, run lazily by control-flow bricks
    Pipeline(Pipeline),
    /// Left untouched by the evaluator
    Defer(Value),
}

impl Expression {
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(path.into())
    }

    pub fn nunjucks(template: impl Into<String>) -> Self {
        Self::Nunjucks(template.into())
    }

    pub fn handlebars(template: impl Into<String>) -> Self {
        Self::Handlebars(template.into())
    }

    pub fn pipeline(steps: impl Into<Pipeline>) -> Self {
        Self::Pipeline(steps.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Var(_) => "var",
            Self::Nunjucks(_) => "nunjucks",
            Self::Handlebars(_) => "handlebars",
            Self::Pipeline(_) => "pipeline",
            Self::Defer(_) => "defer",
        }
    }

    /// Returns `None` when `value` is plain data.
    pub fn detect(value: &Value) -> Option<Result<Expression, ExpressionError>> {
        let tag = value.as_object()?.get(TYPE_KEY)?.as_str()?;
        if !EXPRESSION_TYPES.contains(&tag) {
            return None;
        }
        Some(
            serde_json::from_value(value.clone())
                .map_err(|e| ExpressionError::InvalidExpression(format!("{}: {}", tag, e))),
        )
    }

    pub fn is_expression(value: &Value) -> bool {
        value
            .as_object()
            .and_then(|map| map.get(TYPE_KEY))
            .and_then(Value::as_str)
            .is_some_and(|tag| EXPRESSION_TYPES.contains(&tag))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl From<Expression> for Value {
    fn from(expression: Expression) -> Self {
        expression.to_value()
    }
}

/// Position inside nested or repeated execution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Branch {
    pub key: String,
    pub counter: u64,
}

impl Branch {
    pub fn new(key: impl Into<String>, counter: u64) -> Self {
        Self {
            key: key.into(),
            counter,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.counter)
    }
}

pub type BranchPath = Vec<Branch>;

pub fn format_branches(branches: &[Branch]) -> String {
    branches
        .iter()
        .map(Branch::to_string)
        .collect::<Vec<_>>()
        .join("/")
}
