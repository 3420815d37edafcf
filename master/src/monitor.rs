use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LivenessConfig;
use crate::registry::WorkerRegistry;

/// Barrido periódico de heartbeats: marca DOWN a los workers vencidos.
/// Corre para siempre en su propia tarea.
pub async fn run_liveness_sweep(registry: Arc<WorkerRegistry>, config: LivenessConfig) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    // el primer tick de interval es inmediato
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&registry, &config);
    }
}

/// Una pasada del barrido. Devuelve cuántos workers cayeron en esta pasada.
pub fn sweep_once(registry: &WorkerRegistry, config: &LivenessConfig) -> usize {
    let newly_down = registry.detect_down(config.down_threshold);

    for id in &newly_down {
        warn!(
            "marcando worker {} como DOWN (sin heartbeat hace más de {:?})",
            id, config.down_threshold
        );
    }

    if newly_down.is_empty() {
        debug!("barrido de workers sin cambios");
    }

    newly_down.len()
}
