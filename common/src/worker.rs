use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type WorkerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    /// Dirección base del worker, ej: "http://worker-1:8081".
    pub host: String,
    pub last_heartbeat: DateTime<Utc>,
    pub state: WorkerState,
}

impl WorkerInfo {
    pub fn is_up(&self) -> bool {
        self.state == WorkerState::Up
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub id: WorkerId,
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub id: WorkerId,
}

/// Lo que expone `GET /api/v1/workers`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub host: String,
    pub state: WorkerState,
    pub last_heartbeat: DateTime<Utc>,
    pub last_heartbeat_secs_ago: i64,
    pub active_tasks: usize,
}
