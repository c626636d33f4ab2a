//! Brick Trait: single contract for readers, transforms, effects and renderers
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::abort::AbortSignal;
use crate::context::TemplateContext;
use crate::data_model::{Branch, BrickId, Expression, Pipeline, RunId, Target};
use crate::error::PipelineError;
use crate::schema::Schema;

/// Capability a brick provides, resolved once at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrickKind {
    Reader,
    Transform,
    Effect,
    Renderer,
}

impl fmt::Display for BrickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reader => "reader",
            Self::Transform => "transform",
            Self::Effect => "effect",
            Self::Renderer => "renderer",
        })
    }
}

/// Contract of a registered brick
#[async_trait]
pub trait Brick: Send + Sync {
    /// Registry id (ex: "@brickflow/retry")
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    fn kind(&self) -> BrickKind;

    fn input_schema(&self) -> Schema {
        Schema::any()
    }

    fn output_schema(&self) -> Schema {
        Schema::any()
    }

    /// No side effects; output depends only on args
    fn is_pure(&self) -> bool {
        false
    }

    /// Receives the root the pipeline was triggered on
    fn is_root_aware(&self) -> bool {
        false
    }

    /// Config fields holding nested pipelines. Only these may contain
    /// `pipeline` expressions.
    fn pipeline_slots(&self) -> &'static [&'static str] {
        &[]
    }

    /// Variables this brick binds for its nested pipelines (ex: `@element`)
    fn pipeline_bindings(&self, _config: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Executes the brick with fully resolved args
    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError>;
}

/// Runs nested pipelines on behalf of control-flow bricks
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Run `pipeline` with `ctx` one branch deeper than the calling step
    async fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        branch: Branch,
        ctx: TemplateContext,
    ) -> Result<Value, PipelineError>;
}

/// Everything a brick sees besides its args
pub struct BrickOptions<'a> {
    /// Context the step's args were resolved against
    pub ctx: &'a TemplateContext,
    /// Only set for root-aware bricks
    pub root: Option<&'a Value>,
    pub signal: &'a AbortSignal,
    pub run_id: RunId,
    pub branches: &'a [Branch],
    pub target: Target,
    pub pipelines: &'a dyn PipelineRunner,
}

/// Read a pipeline expression from a resolved arg.
///
/// Absent or `null` is `Ok(None)`; anything that is not a pipeline
/// expression is a validation error on `field`.
pub fn pipeline_arg(args: &Value, field: &str) -> Result<Option<Pipeline>, PipelineError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match Expression::detect(value) {
            Some(Ok(Expression::Pipeline(pipeline))) => Ok(Some(pipeline)),
            Some(Err(e)) => Err(PipelineError::validation(field, e.to_string())),
            _ => Err(PipelineError::validation(
                field,
                "expected a pipeline expression",
            )),
        },
    }
}

/// Like [`pipeline_arg`] but the field must be present
pub fn required_pipeline_arg(args: &Value, field: &str) -> Result<Pipeline, PipelineError> {
    pipeline_arg(args, field)?.ok_or_else(|| PipelineError::validation(field, "is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::BrickConfig;
    use serde_json::json;

    #[test]
    fn test_pipeline_arg() {
        let body = Pipeline::new(vec![BrickConfig::new("test/echo", json!({}))]);
        let args = json!({
            "body": Expression::pipeline(body.clone()).to_value(),
            "count": 3,
        });

        assert_eq!(pipeline_arg(&args, "body").unwrap(), Some(body));
        assert_eq!(pipeline_arg(&args, "missing").unwrap(), None);
        assert_eq!(
            pipeline_arg(&args, "count").unwrap_err().field(),
            Some("count")
        );
        assert!(required_pipeline_arg(&args, "missing").is_err());
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(serde_json::to_value(BrickKind::Effect).unwrap(), json!("effect"));
        assert_eq!(BrickKind::Renderer.to_string(), "renderer");
    }
}
