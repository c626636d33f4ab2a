//! Pipeline Reducer: runs steps strictly in order
//!
//! The reducer never catches. A failing step is traced, wrapped with its
//! [`StepContext`] and returned; catching and retrying belong to
//! control-flow bricks, which recurse back in through [`PipelineRunner`].

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use brick_core::{
    format_branches, AbortSignal, Branch, BrickConfig, BrickOptions, Pipeline, PipelineError,
    PipelineRunner, RunId, StepContext, TemplateContext,
};
use brick_expr::{map_args, ImplicitRender, MapArgsOptions, Realm, TemplateSandbox};
use brick_trace::{TraceOutcome, TraceRecord, TraceRecorder};

use crate::config::RuntimeConfig;
use crate::registry::BrickRegistry;
use crate::truthy;

/// Per-run parameters
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run_id: RunId,
    /// Branch path the pipeline itself runs at
    pub branches: Vec<Branch>,
    pub signal: AbortSignal,
    /// Handed to root-aware bricks
    pub root: Option<Value>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            branches: Vec::new(),
            signal: AbortSignal::never(),
            root: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_root(mut self, root: Value) -> Self {
        self.root = Some(root);
        self
    }
}

pub struct PipelineReducer {
    registry: Arc<BrickRegistry>,
    sandbox: Arc<dyn TemplateSandbox>,
    recorder: TraceRecorder,
    config: RuntimeConfig,
}

impl PipelineReducer {
    /// Reducer with an in-memory trace store sized from `config`
    pub fn new(
        registry: Arc<BrickRegistry>,
        sandbox: Arc<dyn TemplateSandbox>,
        config: RuntimeConfig,
    ) -> Self {
        let recorder = TraceRecorder::in_memory(config.trace.max_records_per_run)
            .with_enabled(config.trace.enabled);
        Self {
            registry,
            sandbox,
            recorder,
            config,
        }
    }

    pub fn with_recorder(mut self, recorder: TraceRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn registry(&self) -> &Arc<BrickRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validate `pipeline`, seed `@input`/`@options` and run it
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        input: Value,
        options: Value,
        run: RunOptions,
    ) -> Result<Value, PipelineError> {
        pipeline.validate()?;

        info!(run_id = %run.run_id, steps = pipeline.len(), "running pipeline");
        let ctx = TemplateContext::seeded(input, options);
        let result = self.reduce_pipeline(pipeline, ctx, &run).await;

        match &result {
            Ok(_) => info!(run_id = %run.run_id, "pipeline completed"),
            Err(error) if error.should_report() => {
                warn!(run_id = %run.run_id, kind = %error.kind(), error = %error, "pipeline failed")
            }
            Err(error) => info!(run_id = %run.run_id, reason = %error.message(), "pipeline cancelled"),
        }
        result
    }

    /// Run `pipeline` against an existing context. Returns the last step's
    /// output, `null` for an empty pipeline.
    pub fn reduce_pipeline<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        ctx: TemplateContext,
        run: &'a RunOptions,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        self.reduce_at(pipeline, ctx, run, &run.branches)
    }

    fn reduce_at<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        ctx: TemplateContext,
        run: &'a RunOptions,
        branches: &'a [Branch],
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        async move {
            let mut ctx = ctx;
            let mut output = Value::Null;

            for step in pipeline {
                run.signal.check()?;

                let span = info_span!(
                    "step",
                    brick_id = %step.id,
                    instance_id = %step.instance_id,
                    branches = %format_branches(branches),
                );
                let Some(value) = self.run_step(step, &ctx, run, branches).instrument(span).await?
                else {
                    continue;
                };

                if let Some(key) = &step.output_key {
                    ctx = ctx.with_output(key, value.clone());
                }
                output = value;
            }

            Ok(output)
        }
        .boxed()
    }

    /// `Ok(None)` when the step was skipped
    async fn run_step(
        &self,
        step: &BrickConfig,
        ctx: &TemplateContext,
        run: &RunOptions,
        branches: &[Branch],
    ) -> Result<Option<Value>, PipelineError> {
        let trace = StepTrace {
            recorder: &self.recorder,
            step,
            ctx,
            run_id: run.run_id,
            branches,
        };
        let plain = MapArgsOptions::new(self.sandbox.as_ref()).with_realm(self.config.realm);

        if let Some(condition) = &step.condition {
            let value = map_args(condition, ctx, &plain)
                .await
                .map_err(|error| trace.fail(None, error))?;
            if !truthy::boolean(&value) {
                debug!("condition is falsy, skipping step");
                trace.record(None, TraceOutcome::Skipped);
                return Ok(None);
            }
        }

        let Some(entry) = self.registry.lookup(&step.id) else {
            return Err(trace.fail(None, PipelineError::BrickNotFound(step.id.clone())));
        };
        let brick = entry.brick.as_ref();

        let nested = NestedRunner {
            reducer: self,
            run,
            branches,
            renders: AtomicU64::new(0),
        };
        let implicit_render = self.config.render_nested_pipelines
            && self.config.realm == Realm::Sandboxed
            && brick.pipeline_slots().is_empty();
        let options = if implicit_render {
            plain.with_implicit_render(&nested)
        } else {
            plain
        };

        let args = map_args(&step.config, ctx, &options)
            .await
            .map_err(|error| trace.fail(None, error))?;

        if let Err(violation) = brick.input_schema().validate(&args) {
            return Err(trace.fail(Some(args), violation.into()));
        }

        let brick_options = BrickOptions {
            ctx,
            root: if brick.is_root_aware() {
                run.root.as_ref()
            } else {
                None
            },
            signal: &run.signal,
            run_id: run.run_id,
            branches,
            target: step.target(),
            pipelines: &nested,
        };

        debug!(kind = %entry.kind, "running brick");
        match brick.run(args.clone(), brick_options).await {
            Ok(output) => {
                trace.record(
                    Some(args),
                    TraceOutcome::output(output.clone(), step.output_key.clone()),
                );
                Ok(Some(output))
            }
            Err(error) => Err(trace.fail(Some(args), error)),
        }
    }
}

/// Trace bookkeeping for one step
struct StepTrace<'a> {
    recorder: &'a TraceRecorder,
    step: &'a BrickConfig,
    ctx: &'a TemplateContext,
    run_id: RunId,
    branches: &'a [Branch],
}

impl StepTrace<'_> {
    fn record(&self, args: Option<Value>, outcome: TraceOutcome) {
        self.recorder.record_step(self.run_id, outcome, |outcome| {
            let mut record = TraceRecord::new(
                self.run_id,
                self.branches.to_vec(),
                self.step.id.clone(),
                self.step.instance_id,
                self.ctx.to_value(),
                outcome,
            );
            record.rendered_args = args;
            record
        });
    }

    /// Record the failure and wrap it with this step's context
    fn fail(&self, args: Option<Value>, error: PipelineError) -> PipelineError {
        if error.should_report() {
            debug!(kind = %error.kind(), error = %error, "step failed");
        }
        self.record(args, TraceOutcome::error(&error));
        error.in_step(StepContext {
            brick_id: self.step.id.clone(),
            instance_id: self.step.instance_id,
            branches: self.branches.to_vec(),
            label: self.step.label.clone(),
        })
    }
}

/// Handle through which a running brick re-enters the reducer
struct NestedRunner<'a> {
    reducer: &'a PipelineReducer,
    run: &'a RunOptions,
    branches: &'a [Branch],
    renders: AtomicU64,
}

impl NestedRunner<'_> {
    fn child_branches(&self, branch: Branch) -> Vec<Branch> {
        let mut branches = Vec::with_capacity(self.branches.len() + 1);
        branches.extend_from_slice(self.branches);
        branches.push(branch);
        branches
    }
}

#[async_trait]
impl<'a> PipelineRunner for NestedRunner<'a> {
    async fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        branch: Branch,
        ctx: TemplateContext,
    ) -> Result<Value, PipelineError> {
        let branches = self.child_branches(branch);
        self.reducer
            .reduce_at(pipeline, ctx, self.run, &branches)
            .await
    }
}

#[async_trait]
impl<'a> ImplicitRender for NestedRunner<'a> {
    async fn render(
        &self,
        pipeline: &Pipeline,
        ctx: &TemplateContext,
    ) -> Result<Value, PipelineError> {
        let counter = self.renders.fetch_add(1, Ordering::Relaxed);
        let branches = self.child_branches(Branch::new("render", counter));
        self.reducer
            .reduce_at(pipeline, ctx.clone(), self.run, &branches)
            .await
    }
}
