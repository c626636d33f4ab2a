//! Template sandbox collaborator
//!
//! The evaluator never renders user templates itself. It hands a
//! [`TemplateRequest`] to a [`TemplateSandbox`], which is either the
//! in-process [`LocalSandbox`] or a [`ChannelSandbox`] worker reached over
//! tokio channels. Both dispatch on [`TemplateRequest::engine`].
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use brick_core::ExpressionError;

use crate::renderer::{TemplateEngine, TemplateRenderer};

/// Privilege level of the code calling the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    /// Host process with full capabilities. User templates must not run here.
    Privileged,
    #[default]
    Sandboxed,
}

/// Where a sandbox executes templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// On the caller's task, sharing its state
    InProcess,
    /// On a separate task that owns its renderer and only sees the request.
    /// Same process and address space: not a security boundary.
    Worker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRequest {
    pub engine: TemplateEngine,
    pub template: String,
    /// Flattened template context
    pub data: Value,
}

#[async_trait]
pub trait TemplateSandbox: Send + Sync {
    fn isolation(&self) -> Isolation;

    async fn run_template(&self, request: TemplateRequest) -> Result<Value, ExpressionError>;
}

/// Renders on the calling task
#[derive(Default)]
pub struct LocalSandbox {
    renderer: TemplateRenderer,
}

impl LocalSandbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateSandbox for LocalSandbox {
    fn isolation(&self) -> Isolation {
        Isolation::InProcess
    }

    async fn run_template(&self, request: TemplateRequest) -> Result<Value, ExpressionError> {
        render(&self.renderer, &request)
    }
}

type Job = (TemplateRequest, oneshot::Sender<Result<Value, ExpressionError>>);

/// Renders on a dedicated worker task that owns its own renderer.
///
/// Templates only see the data sent with the request, never the caller's
/// state, but the worker runs in this process. Cloning shares the worker.
/// The worker stops once every handle is dropped.
#[derive(Clone)]
pub struct ChannelSandbox {
    jobs: mpsc::Sender<Job>,
}

impl ChannelSandbox {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(buffer: usize) -> Self {
        let (jobs, mut queue) = mpsc::channel::<Job>(buffer.max(1));

        tokio::spawn(async move {
            let renderer = TemplateRenderer::new();
            while let Some((request, reply)) = queue.recv().await {
                let result = render(&renderer, &request);
                if reply.send(result).is_err() {
                    debug!("template caller went away before the reply");
                }
            }
            debug!("template sandbox worker stopped");
        });

        Self { jobs }
    }
}

#[async_trait]
impl TemplateSandbox for ChannelSandbox {
    fn isolation(&self) -> Isolation {
        Isolation::Worker
    }

    async fn run_template(&self, request: TemplateRequest) -> Result<Value, ExpressionError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send((request, reply))
            .await
            .map_err(|_| ExpressionError::Sandbox("worker is not running".to_string()))?;
        response
            .await
            .map_err(|_| ExpressionError::Sandbox("worker dropped the request".to_string()))?
    }
}

fn render(renderer: &TemplateRenderer, request: &TemplateRequest) -> Result<Value, ExpressionError> {
    renderer
        .render(request.engine, &request.template, &request.data)
        .map(Value::String)
}
