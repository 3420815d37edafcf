// master/src/registry.rs

use chrono::{DateTime, Utc};
use common::{WorkerId, WorkerInfo, WorkerState};
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tracing::{debug, info};

/// Liveness de la flota. Los registros nunca se borran, sólo alternan UP/DOWN.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, WorkerInfo>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<WorkerId, WorkerInfo>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<WorkerId, WorkerInfo>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Alta (o re-alta) de un worker: queda UP con heartbeat = ahora.
    pub fn register(&self, id: &str, host: &str) {
        let info = WorkerInfo {
            id: id.to_string(),
            host: host.to_string(),
            last_heartbeat: Utc::now(),
            state: WorkerState::Up,
        };

        let previous = self.write().insert(id.to_string(), info);
        info!(
            "worker registrado: {} en {} (re-registro={})",
            id,
            host,
            previous.is_some()
        );
    }

    /// Refresca el heartbeat y fuerza UP. Ids desconocidos se ignoran;
    /// devuelve si el worker existía.
    pub fn heartbeat(&self, id: &str) -> bool {
        let mut workers = self.write();
        match workers.get_mut(id) {
            Some(w) => {
                w.last_heartbeat = Utc::now();
                if w.state == WorkerState::Down {
                    info!("worker {} volvió a estar UP", id);
                }
                w.state = WorkerState::Up;
                true
            }
            None => {
                debug!("heartbeat de worker desconocido {}, ignorado", id);
                false
            }
        }
    }

    /// Marca DOWN a todo worker sin heartbeat hace más de `threshold`.
    /// Devuelve los que pasaron de UP a DOWN en esta pasada.
    pub fn detect_down(&self, threshold: Duration) -> Vec<WorkerId> {
        self.detect_down_at(Utc::now(), threshold)
    }

    pub fn detect_down_at(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<WorkerId> {
        let mut newly_down = Vec::new();
        let mut workers = self.write();

        for (id, w) in workers.iter_mut() {
            // heartbeat en el futuro (reloj movido): no cuenta como vencido
            let Ok(elapsed) = (now - w.last_heartbeat).to_std() else {
                continue;
            };

            if elapsed > threshold {
                if w.state == WorkerState::Up {
                    newly_down.push(id.clone());
                }
                w.state = WorkerState::Down;
            }
        }

        newly_down
    }

    /// Foto de todos los workers, estén UP o DOWN.
    pub fn list(&self) -> Vec<WorkerInfo> {
        self.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<WorkerInfo> {
        self.read().get(id).cloned()
    }
}
