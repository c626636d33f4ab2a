use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use brick_core::{Brick, BrickKind, BrickOptions, PipelineError, Schema};

use crate::{parse_args, WAIT_ID};

#[derive(Debug, Deserialize)]
struct WaitArgs {
    millis: u64,
}

/// Sleeps for `millis`, cancelled by the run's abort signal
pub struct WaitBrick;

#[async_trait]
impl Brick for WaitBrick {
    fn id(&self) -> &str {
        WAIT_ID
    }

    fn name(&self) -> &str {
        "Wait"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": { "millis": { "type": "integer", "minimum": 0 } },
            "required": ["millis"],
        }))
    }

    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let WaitArgs { millis } = parse_args(&args)?;
        debug!(millis, "waiting");

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(Value::Null),
            _ = options.signal.aborted() => {
                options.signal.check()?;
                Err(PipelineError::cancelled("aborted while waiting"))
            }
        }
    }
}
