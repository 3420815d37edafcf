use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    Dag, DagError, Job, JobSubmitResponse, JobTask, SchedulerStats, WorkerHeartbeatRequest,
    WorkerRegisterRequest, WorkerSummary,
};
use serde_json::json;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(submit_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/tasks/:task_id", get(get_task))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/scheduler", get(scheduler_stats))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/* ---------------- errores HTTP ---------------- */

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("DAG inválido: {0}")]
    InvalidDag(#[from] DagError),

    #[error(transparent)]
    NotFound(#[from] JobError),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidDag(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Valida el DAG y crea el job; las tareas fuente quedan encoladas
async fn submit_job(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JobSubmitResponse>, ApiError> {
    let dag = Dag::load(&body).map_err(|e| {
        warn!("DAG rechazado: {}", e);
        e
    })?;

    let job_id = state.jobs.submit(dag);
    Ok(Json(JobSubmitResponse { job_id }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.jobs.list())
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or(ApiError::NotFound(JobError::JobNotFound(id)))
}

async fn get_task(
    State(state): State<AppState>,
    Path((job_id, task_id)): Path<(String, String)>,
) -> Result<Json<JobTask>, ApiError> {
    Ok(Json(state.jobs.get_task(&job_id, &task_id)?))
}

async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.id.trim().is_empty() || req.host.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "id y host son obligatorios".to_string(),
        ));
    }

    state.registry.register(&req.id, &req.host);
    Ok(Json(json!({ "status": "registered", "id": req.id })))
}

// Heartbeat de worker; ids desconocidos no son error
async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Json<serde_json::Value> {
    let known = state.registry.heartbeat(&req.id);
    Json(json!({ "status": "ok", "known": known }))
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerSummary>> {
    let now = Utc::now();

    let mut out: Vec<WorkerSummary> = state
        .registry
        .list()
        .into_iter()
        .map(|w| WorkerSummary {
            active_tasks: state.scheduler.active_tasks(&w.id),
            last_heartbeat_secs_ago: (now - w.last_heartbeat).num_seconds().max(0),
            id: w.id,
            host: w.host,
            state: w.state,
            last_heartbeat: w.last_heartbeat,
        })
        .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));

    Json(out)
}

async fn scheduler_stats(State(state): State<AppState>) -> Json<SchedulerStats> {
    let stats = state.scheduler.stats();
    debug!(
        "stats del scheduler: {} en cola, {} workers con tareas",
        stats.queued_tasks,
        stats.active_tasks.len()
    );
    Json(stats)
}
