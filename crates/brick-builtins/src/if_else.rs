use async_trait::async_trait;
use serde_json::{json, Value};

use brick_core::{
    pipeline_arg, required_pipeline_arg, Branch, Brick, BrickKind, BrickOptions, PipelineError,
    Schema,
};
use brick_runtime::boolean;

use crate::IF_ELSE_ID;

/// Runs `if` when `condition` is truthy, otherwise `else` (or nothing)
pub struct IfElseBrick;

#[async_trait]
impl Brick for IfElseBrick {
    fn id(&self) -> &str {
        IF_ELSE_ID
    }

    fn name(&self) -> &str {
        "If-Else"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn input_schema(&self) -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "if": { "type": "object" },
                "else": { "type": ["object", "null"] },
            },
            "required": ["if"],
        }))
    }

    fn pipeline_slots(&self) -> &'static [&'static str] {
        &["if", "else"]
    }

    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let condition = args.get("condition").is_some_and(boolean);

        let (branch, pipeline) = if condition {
            ("if", Some(required_pipeline_arg(&args, "if")?))
        } else {
            ("else", pipeline_arg(&args, "else")?)
        };

        match pipeline {
            Some(pipeline) => {
                options
                    .pipelines
                    .run_pipeline(&pipeline, Branch::new(branch, 0), options.ctx.clone())
                    .await
            }
            None => Ok(Value::Null),
        }
    }
}
