use anyhow::{Context, Result};
use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_WORKER_PORT: u16 = 8081;
pub const DEFAULT_MASTER_URL: &str = "http://localhost:8080";
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub id: String,
    pub port: u16,
    /// URL con la que el master llega a este worker.
    pub host: String,
    pub master_url: String,
    pub heartbeat_interval: Duration,
    /// Partición que se responde con 500, para probar reintentos.
    pub fail_partition: Option<u32>,
}

impl WorkerConfig {
    /// - En Docker: MASTER_URL=http://master:8080, WORKER_HOST=http://worker1:8081
    /// - Local: defaults contra localhost
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), local_hostname)
    }

    pub fn from_lookup<F, H>(lookup: F, hostname: H) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
        H: FnOnce() -> String,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_var(&var, "WORKER_HTTP_PORT")?.unwrap_or(DEFAULT_WORKER_PORT);
        let heartbeat_ms =
            parse_var(&var, "HEARTBEAT_INTERVAL_MS")?.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        let fail_partition = parse_var(&var, "WORKER_FAIL_PARTITION")?;

        let name = hostname();
        let id = var("WORKER_ID").unwrap_or_else(|| name.clone());
        let host = var("WORKER_HOST").unwrap_or_else(|| format!("http://{name}:{port}"));
        let master_url = var("MASTER_URL")
            .unwrap_or_else(|| DEFAULT_MASTER_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            id,
            port,
            host,
            master_url,
            heartbeat_interval: Duration::from_millis(heartbeat_ms.max(1)),
            fail_partition,
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("valor inválido para {key}: {raw:?}"))
        })
        .transpose()
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "worker".to_string())
}
