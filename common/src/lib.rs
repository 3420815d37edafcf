pub mod dag;
pub mod job;
pub mod task;
pub mod worker;

pub use dag::{Dag, DagDocument, DagError, Stage, StageId};
pub use job::{task_id, Job, JobId, JobState, JobTask, TaskAssignment, TaskStatus};
pub use task::{
    JobSubmitResponse, SchedulerStats, TaskId, TaskRequest, TaskResponse, TASK_STATUS_OK,
};
pub use worker::{
    WorkerHeartbeatRequest, WorkerId, WorkerInfo, WorkerRegisterRequest, WorkerState,
    WorkerSummary,
};

/// Parámetros de una operación: mapa string -> valor JSON arbitrario.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Registro opaco producido por un worker; se guarda tal cual.
pub type Record = serde_json::Value;
