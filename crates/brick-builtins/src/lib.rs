//! Brick Builtins: bricks every runtime ships with
//!
//! Utilities (`echo`, `identity`, `throw`, `wait`) and the control-flow
//! bricks that give pipelines error handling and iteration. Control-flow
//! bricks own pipeline slots and recurse into the reducer through
//! `BrickOptions::pipelines`; their nested pipelines read the parent
//! context but cannot write back to it.
//!
//! ```text
//! @brickflow/retry       { body, maxRetries?, intervalMillis? }
//! @brickflow/try-except  { try, except?, errorKey? }
//! @brickflow/for-each    { elements, elementKey?, body }
//! @brickflow/if-else     { condition, if, else? }
//! ```

mod for_each;
mod if_else;
mod retry;
mod try_except;
mod utility;
mod wait;

pub use for_each::ForEachBrick;
pub use if_else::IfElseBrick;
pub use retry::{RetryBrick, RetryPolicy};
pub use try_except::TryExceptBrick;
pub use utility::{EchoBrick, IdentityBrick, ThrowBrick};
pub use wait::WaitBrick;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use brick_core::PipelineError;
use brick_runtime::{BrickRegistry, RuntimeConfig};

pub const ECHO_ID: &str = "@brickflow/echo";
pub const IDENTITY_ID: &str = "@brickflow/identity";
pub const THROW_ID: &str = "@brickflow/throw";
pub const WAIT_ID: &str = "@brickflow/wait";
pub const RETRY_ID: &str = "@brickflow/retry";
pub const TRY_EXCEPT_ID: &str = "@brickflow/try-except";
pub const FOR_EACH_ID: &str = "@brickflow/for-each";
pub const IF_ELSE_ID: &str = "@brickflow/if-else";

/// Register every built-in brick
pub fn register_builtins(registry: &mut BrickRegistry, config: &RuntimeConfig) {
    registry.register(Arc::new(EchoBrick));
    registry.register(Arc::new(IdentityBrick));
    registry.register(Arc::new(ThrowBrick));
    registry.register(Arc::new(WaitBrick));
    registry.register(Arc::new(RetryBrick::new(RetryPolicy::from(&config.retry))));
    registry.register(Arc::new(TryExceptBrick));
    registry.register(Arc::new(ForEachBrick));
    registry.register(Arc::new(IfElseBrick));
}

/// A registry holding only the built-ins
pub fn default_registry(config: &RuntimeConfig) -> BrickRegistry {
    let mut registry = BrickRegistry::new();
    register_builtins(&mut registry, config);
    registry
}

/// Deserialize resolved args into a brick's typed config
pub(crate) fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, PipelineError> {
    serde_json::from_value(args.clone()).map_err(|e| PipelineError::validation("", e.to_string()))
}

/// Context variable named by an optional key field, ex: `@element`
pub(crate) fn binding_name(config: &Value, field: &str, default: &str) -> String {
    let key = config.get(field).and_then(Value::as_str).unwrap_or(default);
    format!("@{}", key)
}
