//! Trace records
//!
//! One record per attempted step. Records are never mutated after they are
//! appended; consumers clone what they need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use brick_core::{Branch, BrickId, ErrorKind, InstanceId, OutputKey, PipelineError, RunId};

/// A trace entry for one step execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub run_id: RunId,

    /// Position of the call inside loops and nested pipelines
    pub branches: Vec<Branch>,

    pub brick_instance_id: InstanceId,

    pub brick_id: BrickId,

    pub timestamp: DateTime<Utc>,

    /// Flattened context the step's args were resolved against
    pub template_context: Value,

    /// Args after expression resolution. Absent when resolution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_args: Option<Value>,

    pub outcome: TraceOutcome,
}

impl TraceRecord {
    pub fn new(
        run_id: RunId,
        branches: Vec<Branch>,
        brick_id: BrickId,
        brick_instance_id: InstanceId,
        template_context: Value,
        outcome: TraceOutcome,
    ) -> Self {
        Self {
            run_id,
            branches,
            brick_instance_id,
            brick_id,
            timestamp: Utc::now(),
            template_context,
            rendered_args: None,
            outcome,
        }
    }

    pub fn with_rendered_args(mut self, args: Value) -> Self {
        self.rendered_args = Some(args);
        self
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.outcome {
            TraceOutcome::Output { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match &self.outcome {
            TraceOutcome::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, TraceOutcome::Skipped)
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TraceOutcome {
    Output {
        output: Value,
        #[serde(rename = "outputKey", default, skip_serializing_if = "Option::is_none")]
        output_key: Option<OutputKey>,
    },
    Error {
        error: ErrorRecord,
    },
    /// The step's `if` condition was falsy
    Skipped,
}

impl TraceOutcome {
    pub fn output(output: Value, output_key: Option<OutputKey>) -> Self {
        Self::Output { output, output_key }
    }

    pub fn error(error: &PipelineError) -> Self {
        Self::Error {
            error: ErrorRecord::from(error),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Output { .. } => "output",
            Self::Error { .. } => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// Serializable summary of a [`PipelineError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&PipelineError> for ErrorRecord {
    fn from(error: &PipelineError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message(),
            field: error.field().map(str::to_string),
        }
    }
}
