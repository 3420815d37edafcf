use common::{JobId, Params, StageId, TaskAssignment, TaskId};
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

/// Unidad de despacho interna del scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub partition: u32,
    pub attempts: u32,
    pub op: String,
    pub params: Params,
}

impl From<TaskAssignment> for TaskSpec {
    fn from(a: TaskAssignment) -> Self {
        Self {
            job_id: a.job_id,
            task_id: a.task_id,
            stage_id: a.stage_id,
            partition: a.partition,
            attempts: a.attempts,
            op: a.op,
            params: a.params,
        }
    }
}

/// Cola FIFO sin límite. `pop` suspende hasta que haya algo.
/// Sin prioridades ni deduplicación: un reintento es un push más.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<TaskSpec>>,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskSpec>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, task: TaskSpec) {
        self.lock().push_back(task);
        self.available.notify_one();
    }

    pub async fn pop(&self) -> TaskSpec {
        loop {
            // registrarse antes de mirar la cola para no perder un notify
            let notified = self.available.notified();

            let next = self.lock().pop_front();
            if let Some(task) = next {
                return task;
            }

            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<TaskSpec> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
