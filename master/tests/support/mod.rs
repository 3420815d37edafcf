#![allow(dead_code)]

use axum::{
    http::{header, StatusCode},
    routing::post,
    Json, Router,
};
use common::TaskRequest;
use master::{AppState, SchedulerConfig};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Tracing capturado por test; `RUST_LOG=debug cargo test` para verlo.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(20),
        no_worker_backoff: Duration::from_millis(50),
        dispatch_timeout: Duration::from_secs(2),
    }
}

/// Master en memoria con el loop de despacho corriendo.
pub fn running_master(config: SchedulerConfig) -> AppState {
    init_tracing();
    let state = AppState::new(config);
    state.scheduler.start();
    state
}

/// Decide la respuesta a partir del request y del número de llamada (1-based).
pub type Behaviour = Arc<dyn Fn(&TaskRequest, usize) -> (StatusCode, String) + Send + Sync>;

pub struct MockWorker {
    pub host: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<TaskRequest>>>,
}

impl MockWorker {
    pub async fn spawn(delay: Duration, behaviour: Behaviour) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let app = {
            let hits = hits.clone();
            let seen = seen.clone();
            Router::new().route(
                "/task",
                post(move |Json(req): Json<TaskRequest>| {
                    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                    seen.lock().unwrap().push(req.clone());
                    let (status, body) = behaviour(&req, n);
                    async move {
                        tokio::time::sleep(delay).await;
                        (status, [(header::CONTENT_TYPE, "application/json")], body)
                    }
                }),
            )
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            host: format!("http://{addr}"),
            hits,
            seen,
        }
    }

    pub async fn ok_with_output(output: serde_json::Value) -> Self {
        let body = serde_json::json!({ "status": "ok", "output": output }).to_string();
        Self::spawn(
            Duration::ZERO,
            Arc::new(move |_: &TaskRequest, _: usize| (StatusCode::OK, body.clone())),
        )
        .await
    }

    pub async fn always_failing() -> Self {
        Self::spawn(
            Duration::ZERO,
            Arc::new(|_: &TaskRequest, _: usize| {
                (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
            }),
        )
        .await
    }

    pub async fn slow_ok(delay: Duration) -> Self {
        Self::spawn(
            delay,
            Arc::new(|_: &TaskRequest, _: usize| {
                (StatusCode::OK, r#"{"status":"ok"}"#.to_string())
            }),
        )
        .await
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<TaskRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Dirección donde no escucha nadie.
pub async fn unreachable_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Espera (máx. 5s) a que se cumpla la condición.
pub async fn wait_for<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    if polled.is_err() {
        panic!("timeout esperando: {what}");
    }
}
