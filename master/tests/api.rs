mod support;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use master::{handlers::build_router, AppState};
use serde_json::{json, Value};
use support::{fast_config, init_tracing};
use tower::ServiceExt;

/// Router sin loop de despacho: las tareas quedan en la cola.
fn app() -> (Router, AppState) {
    init_tracing();
    let state = AppState::new(fast_config());
    (build_router(state.clone()), state)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

fn two_stage_dag() -> String {
    json!({
        "stages": [
            { "id": "read", "op": "read_csv", "partitions": 2,
              "params": { "path": "/data/*.csv" } },
            { "id": "count", "op": "wordcount", "dependencies": ["read"] }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn health_answers_ok() {
    let (app, _) = app();
    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn valid_dag_is_accepted_and_source_tasks_are_queued() {
    let (app, state) = app();

    let (status, body) = call(&app, post("/api/v1/jobs", two_stage_dag())).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("job-"));

    let (status, job) = call(&app, get(&format!("/api/v1/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["state"], "RUNNING");
    assert_eq!(job["progress"], 0.0);

    let tasks = job["tasks"].as_object().unwrap();
    assert_eq!(tasks.len(), 2);
    let t0 = &tasks[&format!("{job_id}-read-p0")];
    assert_eq!(t0["status"], "PENDING");
    assert_eq!(t0["attempts"], 0);

    let (_, stats) = call(&app, get("/api/v1/scheduler")).await;
    assert_eq!(stats["queued_tasks"], 2);
    assert_eq!(state.scheduler.stats().queued_tasks, 2);
}

#[tokio::test]
async fn cyclic_dag_is_rejected_with_the_cycle() {
    let (app, state) = app();
    let dag = json!({
        "stages": [
            { "id": "a", "dependencies": ["b"] },
            { "id": "b", "dependencies": ["a"] }
        ]
    });

    let (status, body) = call(&app, post("/api/v1/jobs", dag.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ciclo"));
    assert!(state.jobs.list().is_empty());
}

#[tokio::test]
async fn missing_dependency_is_rejected() {
    let (app, _) = app();
    let dag = json!({ "stages": [ { "id": "a", "dependencies": ["ghost"] } ] });

    let (status, body) = call(&app, post("/api/v1/jobs", dag.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let (app, _) = app();
    let (status, body) = call(&app, post("/api/v1/jobs", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn jobs_and_tasks_can_be_looked_up() {
    let (app, _) = app();
    let (_, body) = call(&app, post("/api/v1/jobs", two_stage_dag())).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, list) = call(&app, get("/api/v1/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], job_id.as_str());

    let task_uri = format!("/api/v1/jobs/{job_id}/tasks/{job_id}-read-p1");
    let (status, task) = call(&app, get(&task_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["partition"], 1);
    assert_eq!(task["stage_id"], "read");

    let (status, _) = call(&app, get("/api/v1/jobs/job-nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing_task = format!("/api/v1/jobs/{job_id}/tasks/{job_id}-count-p0");
    let (status, body) = call(&app, get(&missing_task)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn workers_register_heartbeat_and_list() {
    let (app, state) = app();

    let (status, body) = call(
        &app,
        post(
            "/api/v1/workers/register",
            json!({ "id": "w2", "host": "http://w2:8081" }).to_string(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");

    call(
        &app,
        post(
            "/api/v1/workers/register",
            json!({ "id": "w1", "host": "w1:8081" }).to_string(),
        ),
    )
    .await;

    let (status, body) = call(
        &app,
        post("/api/v1/workers/heartbeat", json!({ "id": "w1" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["known"], true);

    // id desconocido: no es error y no registra nada
    let (status, body) = call(
        &app,
        post("/api/v1/workers/heartbeat", json!({ "id": "ghost" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["known"], false);
    assert!(state.registry.get("ghost").is_none());

    let (status, list) = call(&app, get("/api/v1/workers")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["w1", "w2"]);
    assert_eq!(list[0]["state"], "UP");
    assert_eq!(list[0]["active_tasks"], 0);
}

#[tokio::test]
async fn register_without_host_is_a_bad_request() {
    let (app, state) = app();
    let (status, _) = call(
        &app,
        post(
            "/api/v1/workers/register",
            json!({ "id": "w1", "host": "  " }).to_string(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.registry.list().is_empty());
}

#[tokio::test]
async fn empty_dag_job_is_already_succeeded() {
    let (app, _) = app();
    let (_, body) = call(&app, post("/api/v1/jobs", r#"{"stages":[]}"#)).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (_, job) = call(&app, get(&format!("/api/v1/jobs/{job_id}"))).await;
    assert_eq!(job["state"], "SUCCEEDED");
    assert_eq!(job["progress"], 1.0);
    assert!(job["finished_at"].is_string());
}
