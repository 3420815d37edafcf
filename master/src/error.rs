use common::{JobId, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job no encontrado: {0}")]
    JobNotFound(JobId),

    #[error("tarea {task_id} no encontrada en job {job_id}")]
    TaskNotFound { job_id: JobId, task_id: TaskId },
}

/// Falla al despachar una tarea a un worker. Siempre se recupera con reintento.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("error de transporte: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("worker respondió status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("respuesta del worker ilegible: {0}")]
    Envelope(#[source] reqwest::Error),

    #[error("worker rechazó la tarea (status={0:?})")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("valor inválido para {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
