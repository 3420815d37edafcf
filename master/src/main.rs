use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use master::{handlers, monitor, AppState, MasterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("master=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MasterConfig::from_env().context("configuración del master")?;
    info!("configuración: {:?}", config);

    let state = AppState::new(config.scheduler.clone());

    // loop de despacho
    state.scheduler.start();

    // barrido de heartbeats en segundo plano
    tokio::spawn(monitor::run_liveness_sweep(
        state.registry.clone(),
        config.liveness.clone(),
    ));

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind_addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
