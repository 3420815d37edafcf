use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::error::ConfigError;

pub const DEFAULT_MASTER_PORT: u16 = 8080;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_DOWN_THRESHOLD_MS: u64 = 5_000;
pub const DEFAULT_MAX_TASK_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 300;
pub const DEFAULT_NO_WORKER_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 10_000;

/// Cadencia del barrido de heartbeats.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub sweep_interval: Duration,
    pub down_threshold: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            down_threshold: Duration::from_millis(DEFAULT_DOWN_THRESHOLD_MS),
        }
    }
}

/// Reintentos y timeouts del loop de despacho.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Intentos totales por tarea (incluye el primero).
    pub max_attempts: u32,
    /// Espera fija antes de re-encolar una tarea fallida.
    pub retry_delay: Duration,
    /// Espera antes de re-encolar cuando no hay workers UP.
    pub no_worker_backoff: Duration,
    pub dispatch_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_TASK_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            no_worker_backoff: Duration::from_millis(DEFAULT_NO_WORKER_BACKOFF_MS),
            dispatch_timeout: Duration::from_millis(DEFAULT_DISPATCH_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind_addr: SocketAddr,
    pub liveness: LivenessConfig,
    pub scheduler: SchedulerConfig,
}

impl MasterConfig {
    /// Lee la configuración de variables de entorno.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_var(&lookup, "MASTER_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_MASTER_PORT)));

        let millis = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            Ok(Duration::from_millis(
                parse_var(&lookup, var)?.unwrap_or(default),
            ))
        };

        // periodos que no pueden ser cero: interval() entra en pánico y un
        // timeout de 0 hace fallar todo despacho
        let nonzero_millis = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            let value = millis(var, default)?;
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".to_string(),
                });
            }
            Ok(value)
        };

        let liveness = LivenessConfig {
            sweep_interval: nonzero_millis("WORKER_SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS)?,
            down_threshold: millis("WORKER_DOWN_THRESHOLD_MS", DEFAULT_DOWN_THRESHOLD_MS)?,
        };

        let max_attempts: u32 =
            parse_var(&lookup, "MAX_TASK_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_TASK_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_TASK_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let scheduler = SchedulerConfig {
            max_attempts,
            retry_delay: millis("TASK_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
            no_worker_backoff: millis("NO_WORKER_BACKOFF_MS", DEFAULT_NO_WORKER_BACKOFF_MS)?,
            dispatch_timeout: nonzero_millis("DISPATCH_TIMEOUT_MS", DEFAULT_DISPATCH_TIMEOUT_MS)?,
        };

        Ok(Self {
            bind_addr,
            liveness,
            scheduler,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_reference_cadence() {
        let cfg = MasterConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.liveness.sweep_interval, Duration::from_secs(2));
        assert_eq!(cfg.liveness.down_threshold, Duration::from_secs(5));
        assert_eq!(cfg.scheduler.max_attempts, 3);
        assert_eq!(cfg.scheduler.retry_delay, Duration::from_millis(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = MasterConfig::from_lookup(lookup(&[
            ("MASTER_ADDR", "127.0.0.1:9000"),
            ("MAX_TASK_ATTEMPTS", "5"),
            ("DISPATCH_TIMEOUT_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.scheduler.max_attempts, 5);
        assert_eq!(cfg.scheduler.dispatch_timeout, Duration::from_millis(250));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = MasterConfig::from_lookup(lookup(&[("TASK_RETRY_DELAY_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("TASK_RETRY_DELAY_MS"));
        assert!(MasterConfig::from_lookup(lookup(&[("MAX_TASK_ATTEMPTS", "0")])).is_err());
    }

    #[test]
    fn zero_periods_are_rejected() {
        for var in ["WORKER_SWEEP_INTERVAL_MS", "DISPATCH_TIMEOUT_MS"] {
            let err = MasterConfig::from_lookup(lookup(&[(var, "0")])).unwrap_err();
            assert!(err.to_string().contains(var));
        }

        // cero sigue siendo válido donde sólo significa "sin espera"
        let cfg = MasterConfig::from_lookup(lookup(&[("TASK_RETRY_DELAY_MS", "0")])).unwrap();
        assert_eq!(cfg.scheduler.retry_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn accepted_sweep_interval_keeps_the_sweep_alive() {
        let cfg = MasterConfig::from_lookup(lookup(&[("WORKER_SWEEP_INTERVAL_MS", "1")])).unwrap();
        let registry = std::sync::Arc::new(crate::registry::WorkerRegistry::new());

        let handle = tokio::spawn(crate::monitor::run_liveness_sweep(registry, cfg.liveness));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
