//! Unified Error Model
//!
//! The reducer never catches: every error below bubbles to the caller
//! unless a control-flow brick handles it. Step failures are wrapped in
//! [`PipelineError::Step`] so the failing brick can be recovered without
//! inspecting messages.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::data_model::{format_branches, Branch, BrickId, InstanceId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("EXPR/TEMPLATE_SYNTAX: {0}")]
    TemplateSyntax(String),

    #[error("EXPR/TEMPLATE_RENDER: {0}")]
    TemplateRender(String),

    #[error("EXPR/MISSING_VARIABLE: {0} is not defined")]
    MissingVariable(String),

    #[error("EXPR/INVALID: {0}")]
    InvalidExpression(String),

    #[error("EXPR/PRIVILEGED: {0}")]
    PrivilegedEvaluation(String),

    #[error("EXPR/SANDBOX: {0}")]
    Sandbox(String),
}

impl ExpressionError {
    /// Missing variables may be treated as undefined; everything else is fatal.
    pub fn is_lenient(&self) -> bool {
        matches!(self, Self::MissingVariable(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("BRICK/NOT_FOUND: {0}")]
    BrickNotFound(BrickId),

    #[error("INPUT/VALIDATION: {}: {message}", display_field(.field))]
    InputValidation { field: String, message: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("BRICK/EXEC: {0}")]
    Execution(String),

    #[error("CANCELLED: {0}")]
    Cancelled(String),

    #[error("PIPELINE/INVALID: {0}")]
    InvalidPipeline(String),

    #[error("STEP/{context}: {source}")]
    Step {
        context: StepContext,
        source: Box<PipelineError>,
    },
}

fn display_field(field: &str) -> &str {
    if field.is_empty() {
        "<args>"
    } else {
        field
    }
}

impl PipelineError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InputValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the step that was running when this error happened
    pub fn in_step(self, context: StepContext) -> Self {
        Self::Step {
            context,
            source: Box::new(self),
        }
    }

    /// The error with all step wrappers removed
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BrickNotFound(_) => ErrorKind::BrickNotFound,
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::Expression(e) => match e {
                ExpressionError::TemplateSyntax(_) => ErrorKind::TemplateSyntax,
                ExpressionError::TemplateRender(_) => ErrorKind::TemplateRender,
                ExpressionError::MissingVariable(_) => ErrorKind::MissingVariable,
                ExpressionError::InvalidExpression(_) => ErrorKind::InvalidExpression,
                ExpressionError::PrivilegedEvaluation(_) => ErrorKind::PrivilegedEvaluation,
                ExpressionError::Sandbox(_) => ErrorKind::Sandbox,
            },
            Self::Execution(_) => ErrorKind::Execution,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::InvalidPipeline(_) => ErrorKind::InvalidPipeline,
            Self::Step { source, .. } => source.kind(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled(_))
    }

    /// Cancellation, unknown bricks and malformed pipelines fail the same
    /// way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.root_cause(),
            Self::BrickNotFound(_) | Self::Cancelled(_) | Self::InvalidPipeline(_)
        )
    }

    /// Cancelled runs are not application errors.
    pub fn should_report(&self) -> bool {
        !self.is_cancelled()
    }

    /// Step contexts from the outermost control-flow step to the step that failed
    pub fn steps(&self) -> Vec<&StepContext> {
        let mut steps = Vec::new();
        let mut current = self;
        while let Self::Step { context, source } = current {
            steps.push(context);
            current = source.as_ref();
        }
        steps
    }

    /// The innermost step, i.e. the brick that actually failed
    pub fn failed_step(&self) -> Option<&StepContext> {
        self.steps().pop()
    }

    /// Offending config field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self.root_cause() {
            Self::InputValidation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Message of the root cause without step prefixes
    pub fn message(&self) -> String {
        self.root_cause().to_string()
    }
}

/// Where a step error happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepContext {
    pub brick_id: BrickId,
    pub instance_id: InstanceId,
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl fmt::Display for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.brick_id, self.instance_id)?;
        if !self.branches.is_empty() {
            write!(f, " at {}", format_branches(&self.branches))?;
        }
        Ok(())
    }
}

/// Flat classification used by traces and the HTTP surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BrickNotFound,
    InputValidation,
    TemplateSyntax,
    TemplateRender,
    MissingVariable,
    InvalidExpression,
    PrivilegedEvaluation,
    Sandbox,
    Execution,
    Cancelled,
    InvalidPipeline,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrickNotFound => "brick_not_found",
            Self::InputValidation => "input_validation",
            Self::TemplateSyntax => "template_syntax",
            Self::TemplateRender => "template_render",
            Self::MissingVariable => "missing_variable",
            Self::InvalidExpression => "invalid_expression",
            Self::PrivilegedEvaluation => "privileged_evaluation",
            Self::Sandbox => "sandbox",
            Self::Execution => "execution",
            Self::Cancelled => "cancelled",
            Self::InvalidPipeline => "invalid_pipeline",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
