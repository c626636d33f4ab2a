//! Brickflow API /v1: run, analyze and inspect pipelines over HTTP
pub mod handlers;
pub mod metrics;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use brick_builtins::default_registry;
use brick_expr::TemplateSandbox;
use brick_runtime::{PipelineReducer, RuntimeConfig};

use crate::metrics::ApiMetrics;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub reducer: Arc<PipelineReducer>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    /// Reducer over the builtin bricks
    pub fn new(
        config: RuntimeConfig,
        sandbox: Arc<dyn TemplateSandbox>,
    ) -> Result<Self, prometheus::Error> {
        let registry = Arc::new(default_registry(&config));
        let reducer = PipelineReducer::new(registry, sandbox, config);
        Self::from_reducer(reducer)
    }

    /// Hooks the metrics into the reducer's trace recorder
    pub fn from_reducer(reducer: PipelineReducer) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(ApiMetrics::new()?);
        let recorder = reducer
            .recorder()
            .clone()
            .with_observer(metrics.step_observer());

        Ok(Self {
            reducer: Arc::new(reducer.with_recorder(recorder)),
            metrics,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/run", post(handlers::run_pipeline))
        .route("/v1/analyze", post(handlers::analyze))
        .route(
            "/v1/runs/{run_id}/traces",
            get(handlers::list_traces).delete(handlers::clear_traces),
        )
        .route(
            "/v1/runs/{run_id}/traces/{instance_id}/latest",
            get(handlers::latest_trace),
        )
        .route("/v1/bricks", get(handlers::list_bricks))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(from_fn(middleware::log_requests))
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Brickflow API listening on {}", addr);
    axum::serve(listener, app).await
}
