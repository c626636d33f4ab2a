use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use brick_core::{
    pipeline_arg, required_pipeline_arg, Branch, Brick, BrickKind, BrickOptions, OutputKey,
    PipelineError, Schema,
};

use crate::{binding_name, parse_args, TRY_EXCEPT_ID};

const DEFAULT_ERROR_KEY: &str = "error";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TryExceptArgs {
    error_key: Option<String>,
}

/// Runs `try`; on failure runs `except` with the error bound, or returns
/// `null` when there is no `except` branch. Cancellation always propagates.
pub struct TryExceptBrick;

#[async_trait]
impl Brick for TryExceptBrick {
    fn id(&self) -> &str {
        TRY_EXCEPT_ID
    }

    fn name(&self) -> &str {
        "Try-Except"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn input_schema(&self) -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "try": { "type": "object" },
                "except": { "type": ["object", "null"] },
                "errorKey": { "type": "string" },
            },
            "required": ["try"],
        }))
    }

    fn pipeline_slots(&self) -> &'static [&'static str] {
        &["try", "except"]
    }

    fn pipeline_bindings(&self, config: &Value) -> Vec<String> {
        vec![binding_name(config, "errorKey", DEFAULT_ERROR_KEY)]
    }

    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let try_body = required_pipeline_arg(&args, "try")?;
        let except = pipeline_arg(&args, "except")?;
        let TryExceptArgs { error_key } = parse_args(&args)?;
        let error_key = OutputKey::new(error_key.as_deref().unwrap_or(DEFAULT_ERROR_KEY))
            .map_err(|e| PipelineError::validation("errorKey", e.to_string()))?;

        let error = match options
            .pipelines
            .run_pipeline(&try_body, Branch::new("try", 0), options.ctx.clone())
            .await
        {
            Ok(output) => return Ok(output),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => error,
        };

        let Some(except) = except else {
            debug!(error = %error, "no except branch, discarding error");
            return Ok(Value::Null);
        };

        debug!(error = %error, "running except branch");
        let ctx = options.ctx.with_output(
            &error_key,
            json!({
                "name": error.kind().as_str(),
                "message": error.message(),
            }),
        );
        options
            .pipelines
            .run_pipeline(&except, Branch::new("except", 0), ctx)
            .await
    }
}
