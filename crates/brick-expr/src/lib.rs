//! Brick Expr: the expression evaluator
//!
//! [`map_args`] walks a brick's `config` and resolves every embedded
//! expression against the current [`TemplateContext`]:
//!
//! - `var`: path lookup, missing values are undefined
//! - `nunjucks` / `handlebars`: rendered through a [`TemplateSandbox`]
//! - `pipeline`: left as-is unless an [`ImplicitRender`] is supplied
//! - `defer`: always left as-is
//!
//! # Example
//!
//! ```ignore
//! use brick_expr::{map_args, LocalSandbox, MapArgsOptions};
//! use brick_core::{Expression, TemplateContext};
//! use serde_json::json;
//!
//! let sandbox = LocalSandbox::new();
//! let ctx = TemplateContext::seeded(json!({ "msg": "hi" }), json!({}));
//! let config = json!({ "message": Expression::var("@input.msg").to_value() });
//!
//! let args = map_args(&config, &ctx, &MapArgsOptions::new(&sandbox)).await?;
//! assert_eq!(args, json!({ "message": "hi" }));
//! ```

pub mod path;
pub mod renderer;
pub mod sandbox;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use brick_core::{Expression, ExpressionError, Pipeline, PipelineError, TemplateContext};

pub use path::{get_in, lookup, parse_path, require_var, root_variable, Segment};
pub use renderer::{TemplateEngine, TemplateRenderer};
pub use sandbox::{
    ChannelSandbox, Isolation, LocalSandbox, Realm, TemplateRequest, TemplateSandbox,
};

/// Lazily runs nested pipelines found in args (ex: list rendering)
#[async_trait]
pub trait ImplicitRender: Send + Sync {
    async fn render(&self, pipeline: &Pipeline, ctx: &TemplateContext)
        -> Result<Value, PipelineError>;
}

/// Collaborators and policy for one evaluation
#[derive(Clone, Copy)]
pub struct MapArgsOptions<'a> {
    pub sandbox: &'a dyn TemplateSandbox,
    pub realm: Realm,
    pub implicit_render: Option<&'a dyn ImplicitRender>,
}

impl<'a> MapArgsOptions<'a> {
    pub fn new(sandbox: &'a dyn TemplateSandbox) -> Self {
        Self {
            sandbox,
            realm: Realm::default(),
            implicit_render: None,
        }
    }

    pub fn with_realm(mut self, realm: Realm) -> Self {
        self.realm = realm;
        self
    }

    pub fn with_implicit_render(mut self, implicit_render: &'a dyn ImplicitRender) -> Self {
        self.implicit_render = Some(implicit_render);
        self
    }
}

/// Resolve every expression in `config`. An undefined result is `null`.
pub async fn map_args(
    config: &Value,
    ctx: &TemplateContext,
    options: &MapArgsOptions<'_>,
) -> Result<Value, PipelineError> {
    Ok(evaluate(config, ctx, options).await?.unwrap_or(Value::Null))
}

/// Like [`map_args`] but keeps undefined as `None`
pub async fn evaluate(
    value: &Value,
    ctx: &TemplateContext,
    options: &MapArgsOptions<'_>,
) -> Result<Option<Value>, PipelineError> {
    if options.realm == Realm::Privileged && options.implicit_render.is_some() {
        return Err(ExpressionError::PrivilegedEvaluation(
            "nested pipelines cannot be rendered in the privileged realm".to_string(),
        )
        .into());
    }
    resolve(value, ctx, options).await
}

fn resolve<'a, 'b: 'a>(
    value: &'a Value,
    ctx: &'a TemplateContext,
    options: &'a MapArgsOptions<'b>,
) -> BoxFuture<'a, Result<Option<Value>, PipelineError>> {
    async move {
        if let Some(expression) = Expression::detect(value) {
            return resolve_expression(value, expression?, ctx, options).await;
        }

        match value {
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, member) in map {
                    if let Some(member) = resolve(member, ctx, options).await? {
                        resolved.insert(key.clone(), member);
                    }
                }
                Ok(Some(Value::Object(resolved)))
            }
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(resolve(item, ctx, options).await?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(resolved)))
            }
            literal => Ok(Some(literal.clone())),
        }
    }
    .boxed()
}

async fn resolve_expression(
    raw: &Value,
    expression: Expression,
    ctx: &TemplateContext,
    options: &MapArgsOptions<'_>,
) -> Result<Option<Value>, PipelineError> {
    match expression {
        Expression::Var(path) => Ok(path::lookup(ctx, &path)),
        Expression::Nunjucks(template) => {
            render_template(TemplateEngine::Nunjucks, template, ctx, options).await
        }
        Expression::Handlebars(template) => {
            render_template(TemplateEngine::Handlebars, template, ctx, options).await
        }
        Expression::Pipeline(pipeline) => match options.implicit_render {
            Some(implicit_render) => implicit_render.render(&pipeline, ctx).await.map(Some),
            None => Ok(Some(raw.clone())),
        },
        Expression::Defer(_) => Ok(Some(raw.clone())),
    }
}

async fn render_template(
    engine: TemplateEngine,
    template: String,
    ctx: &TemplateContext,
    options: &MapArgsOptions<'_>,
) -> Result<Option<Value>, PipelineError> {
    if options.realm == Realm::Privileged && options.sandbox.isolation() == Isolation::InProcess {
        return Err(ExpressionError::PrivilegedEvaluation(
            "templates must be rendered on a sandbox worker".to_string(),
        )
        .into());
    }

    let request = TemplateRequest {
        engine,
        template,
        data: ctx.to_value(),
    };
    let rendered = options.sandbox.run_template(request).await?;
    Ok(Some(rendered))
}
