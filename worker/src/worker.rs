use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{TaskRequest, TaskResponse, WorkerHeartbeatRequest, WorkerRegisterRequest};
use reqwest::Client;
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;
use crate::ops;

/// Lo que el handler de tareas necesita saber del worker.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub worker_id: String,
    pub fail_partition: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatAck {
    #[serde(default)]
    known: bool,
}

/// Loop principal del worker.
/// - Se registra en el master.
/// - Hace heartbeats periódicos (y se re-registra si el master no lo conoce).
/// - Atiende `POST /task` hasta que el proceso muere.
pub async fn run() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("worker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = WorkerConfig::from_env().context("configuración del worker")?;
    info!("configuración: {:?}", config);

    let client = Client::new();

    // 1) Registro inicial; si falla, el loop de heartbeat reintenta
    if let Err(e) = register(&client, &config).await {
        warn!("no se pudo registrar contra {}: {:#}", config.master_url, e);
    }

    // 2) Heartbeats en segundo plano
    tokio::spawn(heartbeat_loop(client, config.clone()));

    // 3) Endpoint de tareas
    let app = build_router(TaskContext {
        worker_id: config.id.clone(),
        fail_partition: config.fail_partition,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {addr}"))?;
    info!("worker {} escuchando en {}", config.id, listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(ctx: TaskContext) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/task", post(run_task))
        .with_state(Arc::new(ctx))
}

/* --------- master --------- */

async fn register(client: &Client, config: &WorkerConfig) -> Result<()> {
    let url = format!("{}/api/v1/workers/register", config.master_url);
    client
        .post(&url)
        .json(&WorkerRegisterRequest {
            id: config.id.clone(),
            host: config.host.clone(),
        })
        .send()
        .await?
        .error_for_status()?;

    info!(
        "worker {} registrado como {} contra {}",
        config.id, config.host, config.master_url
    );
    Ok(())
}

async fn heartbeat_loop(client: Client, config: WorkerConfig) {
    let url = format!("{}/api/v1/workers/heartbeat", config.master_url);
    let mut ticker = tokio::time::interval(config.heartbeat_interval);

    loop {
        ticker.tick().await;

        let ack = send_heartbeat(&client, &url, &config.id).await;

        match ack {
            Ok(HeartbeatAck { known: true }) => debug!("heartbeat enviado ({})", config.id),
            Ok(HeartbeatAck { known: false }) => {
                // el master se reinició o nunca nos vio
                warn!("el master no conoce al worker {}, re-registrando", config.id);
                if let Err(e) = register(&client, &config).await {
                    warn!("re-registro fallido: {:#}", e);
                }
            }
            Err(e) => warn!("heartbeat fallido contra {}: {}", config.master_url, e),
        }
    }
}

async fn send_heartbeat(client: &Client, url: &str, id: &str) -> reqwest::Result<HeartbeatAck> {
    client
        .post(url)
        .json(&WorkerHeartbeatRequest { id: id.to_string() })
        .send()
        .await?
        .error_for_status()?
        .json::<HeartbeatAck>()
        .await
}

/* --------- tareas --------- */

async fn run_task(
    State(ctx): State<Arc<TaskContext>>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    info!(
        "worker {} ejecutando tarea {} (op={} stage={} partition={})",
        ctx.worker_id, req.task_id, req.op, req.stage_id, req.partition
    );

    // fallo simulado
    if ctx.fail_partition == Some(req.partition) {
        warn!("fallo simulado para la partición {}", req.partition);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "error simulado".to_string(),
        ));
    }

    let op = req.op.clone();
    let handle =
        tokio::task::spawn_blocking(move || ops::execute(&req.op, &req.params, req.partition));

    match handle.await {
        Ok(Ok(output)) => {
            debug!(
                "tarea terminada ({} registros)",
                output.as_ref().map_or(0, Vec::len)
            );
            Ok(Json(TaskResponse::ok(output)))
        }
        Ok(Err(e)) => {
            warn!("error en {}: {:#}", op, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{op} error: {e:#}"),
            ))
        }
        Err(e) => {
            warn!("panic o join error en {}: {:?}", op, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{op} error: tarea abortada"),
            ))
        }
    }
}
