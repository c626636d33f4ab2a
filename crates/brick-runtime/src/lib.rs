//! Brick Runtime: registry, pipeline reducer and analysis
//!
//! # Example
//!
//! ```ignore
//! use brick_runtime::{BrickRegistry, PipelineReducer, RunOptions, RuntimeConfig};
//! use brick_expr::LocalSandbox;
//! use std::sync::Arc;
//!
//! let mut registry = BrickRegistry::new();
//! registry.register(Arc::new(MyBrick));
//!
//! let reducer = PipelineReducer::new(
//!     Arc::new(registry),
//!     Arc::new(LocalSandbox::new()),
//!     RuntimeConfig::default(),
//! );
//! let output = reducer.run(&pipeline, input, json!({}), RunOptions::new()).await?;
//! ```

pub mod analysis;
pub mod config;
pub mod reducer;
pub mod registry;
pub mod truthy;

pub use analysis::{analyze_pipeline, has_errors, Annotation, AnnotationKind, AnnotationLevel};
pub use config::{ConfigError, RetryConfig, RetryDelay, RuntimeConfig, TraceConfig};
pub use reducer::{PipelineReducer, RunOptions};
pub use registry::{BrickRegistry, RegisteredBrick};
pub use truthy::boolean;
