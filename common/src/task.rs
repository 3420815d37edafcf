use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dag::StageId;
use crate::job::JobId;
use crate::worker::WorkerId;
use crate::{Params, Record};

pub type TaskId = String;

pub const TASK_STATUS_OK: &str = "ok";

/// Cuerpo que el master envía a `POST <worker>/task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub partition: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub op: String,

    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

/// Respuesta del worker: `{"status":"ok","output":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Record>>,
}

impl TaskResponse {
    pub fn ok(output: Option<Vec<Record>>) -> Self {
        Self {
            status: TASK_STATUS_OK.to_string(),
            output,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TASK_STATUS_OK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub job_id: JobId,
}

/// Foto del scheduler: cola pendiente y tareas en vuelo por worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub queued_tasks: usize,
    pub active_tasks: BTreeMap<WorkerId, usize>,
}
