//! Brick Core: data model, Brick trait, template context and errors
//!
//! Shared vocabulary of the pipeline runtime. A pipeline is an ordered list
//! of [`BrickConfig`] steps whose args may embed [`Expression`]s; the
//! reducer resolves them against a [`TemplateContext`] and dispatches each
//! step to a registered [`Brick`].

pub mod abort;
pub mod brick;
pub mod context;
pub mod data_model;
pub mod error;
pub mod schema;

pub use abort::{AbortController, AbortSignal};
pub use brick::{pipeline_arg, required_pipeline_arg, Brick, BrickKind, BrickOptions, PipelineRunner};
pub use context::{TemplateContext, INPUT_KEY, OPTIONS_KEY, RESERVED_NAMES, TEMPLATE_DATA_NAMES};
pub use data_model::{
    format_branches, Branch, BranchPath, BrickConfig, BrickId, Expression, InstanceId, OutputKey,
    Pipeline, RunId, Target,
};
pub use error::{ErrorKind, ExpressionError, PipelineError, StepContext};
pub use schema::{Schema, SchemaViolation};

/// Runtime engine version, reported by the API
pub const ENGINE_VERSION: &str = "1.0.0";
