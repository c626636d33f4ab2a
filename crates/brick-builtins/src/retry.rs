use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use brick_core::{
    required_pipeline_arg, Branch, Brick, BrickKind, BrickOptions, PipelineError, Schema,
};
use brick_runtime::{RetryConfig, RetryDelay};

use crate::{parse_args, RETRY_ID};

/// Defaults applied when a retry step leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: RetryDelay,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.default_max_retries,
            delay: config.delay,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryArgs {
    max_retries: Option<u32>,
    interval_millis: Option<u64>,
}

/// Runs `body` until it succeeds, at most `maxRetries + 1` times.
///
/// Errors that would fail identically on every attempt (unknown brick,
/// cancellation, invalid pipeline) are returned immediately.
#[derive(Default)]
pub struct RetryBrick {
    policy: RetryPolicy,
}

impl RetryBrick {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Brick for RetryBrick {
    fn id(&self) -> &str {
        RETRY_ID
    }

    fn name(&self) -> &str {
        "Retry"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn input_schema(&self) -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "body": { "type": "object" },
                "maxRetries": { "type": "integer", "minimum": 0 },
                "intervalMillis": { "type": "integer", "minimum": 0 },
            },
            "required": ["body"],
        }))
    }

    fn pipeline_slots(&self) -> &'static [&'static str] {
        &["body"]
    }

    async fn run(&self, args: Value, options: BrickOptions<'_>) -> Result<Value, PipelineError> {
        let body = required_pipeline_arg(&args, "body")?;
        let retry: RetryArgs = parse_args(&args)?;
        let max_retries = retry.max_retries.unwrap_or(self.policy.max_retries);
        let delay = retry
            .interval_millis
            .map(|millis| RetryDelay::Fixed { millis })
            .unwrap_or(self.policy.delay);

        let mut attempt: u32 = 0;
        loop {
            let result = options
                .pipelines
                .run_pipeline(&body, Branch::new("body", u64::from(attempt)), options.ctx.clone())
                .await;

            let error = match result {
                Ok(output) => {
                    debug!(attempt, "retry body succeeded");
                    return Ok(output);
                }
                Err(error) => error,
            };
            if !error.is_retryable() || attempt >= max_retries {
                return Err(error);
            }

            warn!(attempt, max_retries, error = %error, "retry body failed, retrying");
            let wait = delay.delay_for(attempt);
            if !wait.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = options.signal.aborted() => {
                        options.signal.check()?;
                    }
                }
            }
            attempt += 1;
        }
    }
}
