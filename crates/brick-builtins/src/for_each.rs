use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use brick_core::{
    required_pipeline_arg, Branch, Brick, BrickKind, BrickOptions, OutputKey, PipelineError,
    Schema,
};

use crate::{binding_name, parse_args, FOR_EACH_ID};

const DEFAULT_ELEMENT_KEY: &str = "element";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForEachArgs {
    elements: Vec<Value>,
    element_key: Option<String>,
}

/// Runs `body` once per element with `@element` bound. Returns the last
/// iteration's output, `null` for no elements.
pub struct ForEachBrick;

#[async_trait]
impl Brick for ForEachBrick {
    fn id(&self) -> &str {
        FOR_EACH_ID
    }

    fn name(&self) -> &str {
        "For-Each"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn input_schema(&self) -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "elements": { "type": "array" },
                "elementKey": { "type": "string" },
                "body": { "type": "object" },
            },
            "required": ["elements", "body"],
        }))
    }

    fn pipeline_slots(&self) -> &'static [&'static str] {
        &["body"]
    }

    fn pipeline_bindings(&self, config: &Value) -> Vec<String> {
        vec![binding_name(config, "elementKey", DEFAULT_ELEMENT_KEY)]
    }

    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let body = required_pipeline_arg(&args, "body")?;
        let ForEachArgs {
            elements,
            element_key,
        } = parse_args(&args)?;
        let element_key = OutputKey::new(element_key.as_deref().unwrap_or(DEFAULT_ELEMENT_KEY))
            .map_err(|e| PipelineError::validation("elementKey", e.to_string()))?;

        let mut last = Value::Null;
        for (index, element) in elements.into_iter().enumerate() {
            let ctx = options.ctx.with_output(&element_key, element);
            last = options
                .pipelines
                .run_pipeline(&body, Branch::new("body", index as u64), ctx)
                .await?;
        }
        Ok(last)
    }
}
