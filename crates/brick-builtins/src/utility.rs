use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use brick_core::{Brick, BrickKind, BrickOptions, PipelineError, Schema};

use crate::{parse_args, ECHO_ID, IDENTITY_ID, THROW_ID};

#[derive(Debug, Deserialize)]
struct MessageArgs {
    message: String,
}

fn message_schema() -> Schema {
    Schema::new(json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"],
    }))
}

/// `{ message }` in, `{ message }` out
pub struct EchoBrick;

#[async_trait]
impl Brick for EchoBrick {
    fn id(&self) -> &str {
        ECHO_ID
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn input_schema(&self) -> Schema {
        message_schema()
    }

    fn output_schema(&self) -> Schema {
        message_schema()
    }

    fn is_pure(&self) -> bool {
        true
    }

    async fn run(&self, args: Value, _options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let MessageArgs { message } = parse_args(&args)?;
        Ok(json!({ "message": message }))
    }
}

/// Returns its resolved args unchanged
pub struct IdentityBrick;

#[async_trait]
impl Brick for IdentityBrick {
    fn id(&self) -> &str {
        IDENTITY_ID
    }

    fn name(&self) -> &str {
        "Identity"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_pure(&self) -> bool {
        true
    }

    async fn run(&self, args: Value, _options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        Ok(args)
    }
}

/// Always fails with `message`
pub struct ThrowBrick;

#[async_trait]
impl Brick for ThrowBrick {
    fn id(&self) -> &str {
        THROW_ID
    }

    fn name(&self) -> &str {
        "Throw"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        message_schema()
    }

    async fn run(&self, args: Value, _options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let MessageArgs { message } = parse_args(&args)?;
        Err(PipelineError::Execution(message))
    }
}
