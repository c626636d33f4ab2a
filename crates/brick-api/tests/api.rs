//! HTTP surface tests
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use brick_api::{create_app, AppState};
use brick_expr::LocalSandbox;
use brick_runtime::RuntimeConfig;

const RUN_ID: &str = "6f1c2b9e-3d4a-4c5b-9e8f-0a1b2c3d4e5f";
const INSTANCE_ID: &str = "0d6b8f3a-1c2e-4f5a-8b9c-7e6d5c4b3a21";

fn app() -> Router {
    let state = AppState::new(RuntimeConfig::default(), Arc::new(LocalSandbox::new())).unwrap();
    create_app(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn echo_pipeline() -> Value {
    json!([{
        "id": "@brickflow/echo",
        "config": { "message": { "__type__": "var", "__value__": "@input.msg" } },
        "outputKey": "out",
        "instanceId": INSTANCE_ID,
    }])
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bricks"], 8);
}

#[tokio::test]
async fn test_run_echo() {
    let (status, body) = send(
        &app(),
        post(
            "/v1/run",
            json!({ "pipeline": echo_pipeline(), "input": { "msg": "hi" }, "runId": RUN_ID }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runId"], RUN_ID);
    assert_eq!(body["output"], json!({ "message": "hi" }));
}

#[tokio::test]
async fn test_run_unknown_brick_is_404() {
    let (status, body) = send(
        &app(),
        post("/v1/run", json!({ "pipeline": [{ "id": "@brickflow/missing" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "brick_not_found");
    assert_eq!(body["error"]["step"]["brickId"], "@brickflow/missing");
    assert!(body["runId"].is_string());
}

#[tokio::test]
async fn test_run_validation_error_names_field() {
    let (status, body) = send(
        &app(),
        post(
            "/v1/run",
            json!({ "pipeline": [{ "id": "@brickflow/echo", "config": { "message": 42 } }] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "input_validation");
    assert_eq!(body["error"]["field"], "message");
}

#[tokio::test]
async fn test_run_execution_error_is_500() {
    let (status, body) = send(
        &app(),
        post(
            "/v1/run",
            json!({ "pipeline": [{ "id": "@brickflow/throw", "config": { "message": "boom" } }] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["kind"], "execution");
    assert!(body["error"]["message"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_try_except_recovers_over_http() {
    let pipeline = json!([{
        "id": "@brickflow/try-except",
        "config": {
            "try": { "__type__": "pipeline", "__value__": [
                { "id": "@brickflow/throw", "config": { "message": "boom" } }
            ] },
            "except": { "__type__": "pipeline", "__value__": [
                { "id": "@brickflow/echo", "config": { "message": "recovered" } }
            ] },
        },
    }]);

    let (status, body) = send(&app(), post("/v1/run", json!({ "pipeline": pipeline }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], json!({ "message": "recovered" }));
}

#[tokio::test]
async fn test_analyze_reports_unknown_brick() {
    let (status, body) = send(
        &app(),
        post("/v1/analyze", json!({ "pipeline": [{ "id": "@brickflow/missing" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let annotations = body["annotations"].as_array().unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0]["kind"], "unknown_brick");
    assert_eq!(annotations[0]["position"], "pipeline.0.id");
}

#[tokio::test]
async fn test_trace_lifecycle() {
    let app = app();
    let (status, _) = send(
        &app,
        post(
            "/v1/run",
            json!({ "pipeline": echo_pipeline(), "input": { "msg": "hi" }, "runId": RUN_ID }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/v1/runs/{RUN_ID}/traces"))).await;
    assert_eq!(status, StatusCode::OK);
    let traces = body["traces"].as_array().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["brickId"], "@brickflow/echo");
    assert_eq!(traces[0]["outcome"]["status"], "output");

    let (status, body) = send(
        &app,
        get(&format!("/v1/runs/{RUN_ID}/traces/{INSTANCE_ID}/latest")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["output"], json!({ "message": "hi" }));
    assert_eq!(body["renderedArgs"], json!({ "message": "hi" }));

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/runs/{RUN_ID}/traces"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    let (status, _) = send(
        &app,
        get(&format!("/v1/runs/{RUN_ID}/traces/{INSTANCE_ID}/latest")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_bricks() {
    let (status, body) = send(&app(), get("/v1/bricks")).await;

    assert_eq!(status, StatusCode::OK);
    let bricks = body["bricks"].as_array().unwrap();
    let retry = bricks
        .iter()
        .find(|brick| brick["id"] == "@brickflow/retry")
        .unwrap();
    assert_eq!(retry["pipelineSlots"], json!(["body"]));

    let ids: Vec<&str> = bricks.iter().map(|b| b["id"].as_str().unwrap()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn test_metrics_count_runs() {
    let app = app();
    send(
        &app,
        post("/v1/run", json!({ "pipeline": echo_pipeline(), "input": { "msg": "hi" } })),
    )
    .await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("brickflow_runs_total{status=\"ok\"} 1"));
    assert!(text.contains("brickflow_steps_total{status=\"output\"} 1"));
}

async fn metrics_text(app: &Router) -> String {
    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_metrics_count_steps_for_reused_run_id() {
    let app = app();
    for _ in 0..2 {
        let (status, _) = send(
            &app,
            post(
                "/v1/run",
                json!({ "pipeline": echo_pipeline(), "input": { "msg": "hi" }, "runId": RUN_ID }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let text = metrics_text(&app).await;
    assert!(text.contains("brickflow_steps_total{status=\"output\"} 2"));
}

#[tokio::test]
async fn test_metrics_count_steps_with_tracing_disabled() {
    let mut config = RuntimeConfig::default();
    config.trace.enabled = false;
    let state = AppState::new(config, Arc::new(LocalSandbox::new())).unwrap();
    let app = create_app(state);

    send(
        &app,
        post("/v1/run", json!({ "pipeline": echo_pipeline(), "input": { "msg": "hi" }, "runId": RUN_ID })),
    )
    .await;

    let (_, body) = send(&app, get(&format!("/v1/runs/{RUN_ID}/traces"))).await;
    assert_eq!(body["traces"], json!([]));

    let text = metrics_text(&app).await;
    assert!(text.contains("brickflow_steps_total{status=\"output\"} 1"));
}
