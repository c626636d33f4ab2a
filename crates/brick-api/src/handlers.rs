//! API Handlers
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use brick_core::{ErrorKind, InstanceId, Pipeline, PipelineError, RunId, StepContext, ENGINE_VERSION};
use brick_runtime::{analyze_pipeline, RunOptions};
use brick_trace::get_latest_call;

use crate::AppState;

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub pipeline: Pipeline,
    #[serde(default = "empty_object")]
    pub input: Value,
    #[serde(default = "empty_object")]
    pub options: Value,
    pub run_id: Option<RunId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: RunId,
    pub output: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Innermost step that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepContext>,
}

/// Error response; the body carries the run id when there is one
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    run_id: Option<RunId>,
    body: ErrorBody,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            run_id: None,
            body: ErrorBody {
                kind: "not_found".to_string(),
                message: message.into(),
                field: None,
                step: None,
            },
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            run_id: None,
            body: ErrorBody {
                kind: "internal".to_string(),
                message: message.into(),
                field: None,
                step: None,
            },
        }
    }

    fn pipeline(run_id: RunId, error: &PipelineError) -> Self {
        Self {
            status: status_for(error),
            run_id: Some(run_id),
            body: ErrorBody {
                kind: error.kind().to_string(),
                message: error.message(),
                field: error.field().map(str::to_string),
                step: error.failed_step().cloned(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.run_id {
            Some(run_id) => json!({ "runId": run_id, "error": self.body }),
            None => json!({ "error": self.body }),
        };
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for a failed run
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error.kind() {
        ErrorKind::BrickNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InputValidation
        | ErrorKind::TemplateSyntax
        | ErrorKind::TemplateRender
        | ErrorKind::MissingVariable
        | ErrorKind::InvalidExpression
        | ErrorKind::PrivilegedEvaluation
        | ErrorKind::InvalidPipeline => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Execution | ErrorKind::Sandbox => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn run_pipeline(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = request.run_id.unwrap_or_else(Uuid::new_v4);
    let result = state
        .reducer
        .run(
            &request.pipeline,
            request.input,
            request.options,
            RunOptions::new().with_run_id(run_id),
        )
        .await;

    match result {
        Ok(output) => {
            state.metrics.observe_run("ok");
            Ok(Json(RunResponse { run_id, output }))
        }
        Err(e) => {
            state.metrics.observe_run(e.kind().as_str());
            Err(ApiError::pipeline(run_id, &e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub pipeline: Pipeline,
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<Value> {
    let annotations = analyze_pipeline(&request.pipeline, state.reducer.registry());
    Json(json!({ "annotations": annotations }))
}

pub async fn list_traces(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Json<Value> {
    let traces = state.reducer.recorder().store().list(run_id);
    Json(json!({ "runId": run_id, "traces": traces }))
}

pub async fn latest_trace(
    State(state): State<AppState>,
    Path((run_id, instance_id)): Path<(RunId, InstanceId)>,
) -> Result<Json<Value>, ApiError> {
    let records = state
        .reducer
        .recorder()
        .store()
        .list_for_instance(run_id, instance_id);
    let latest = get_latest_call(&records)
        .ok_or_else(|| ApiError::not_found(format!("no trace for {} in run {}", instance_id, run_id)))?;
    Ok(Json(json!(latest)))
}

pub async fn clear_traces(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Json<Value> {
    let removed = state.reducer.recorder().store().clear(run_id);
    Json(json!({ "runId": run_id, "removed": removed }))
}

pub async fn list_bricks(State(state): State<AppState>) -> Json<Value> {
    let registry = state.reducer.registry();
    let bricks: Vec<Value> = registry
        .ids()
        .into_iter()
        .filter_map(|id| registry.lookup(id))
        .map(|entry| {
            let brick = entry.brick.as_ref();
            json!({
                "id": brick.id(),
                "name": brick.name(),
                "kind": entry.kind,
                "pure": brick.is_pure(),
                "rootAware": brick.is_root_aware(),
                "pipelineSlots": brick.pipeline_slots(),
                "inputSchema": brick.input_schema(),
            })
        })
        .collect();
    Json(json!({ "bricks": bricks }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": ENGINE_VERSION,
            "bricks": state.reducer.registry().len(),
            "time": Utc::now(),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.encode().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        ApiError::internal(e.to_string())
    })?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
