use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dag::{Dag, StageId};
use crate::task::TaskId;
use crate::worker::WorkerId;
use crate::{Params, Record};

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Accepted,
    Running,
    Succeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Registro de ejecución de un par (stage, partición) dentro de un job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub id: TaskId,
    pub stage_id: StageId,
    pub partition: u32,
    pub status: TaskStatus,
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<WorkerId>,

    /// Output del worker, guardado sin modificar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Record>>,
}

impl JobTask {
    pub fn pending(id: TaskId, stage_id: StageId, partition: u32) -> Self {
        Self {
            id,
            stage_id,
            partition,
            status: TaskStatus::Pending,
            attempts: 0,
            assigned_to: None,
            result: None,
        }
    }
}

/// Id determinístico de una tarea: `{job}-{stage}-p{partition}`.
pub fn task_id(job_id: &str, stage_id: &str, partition: u32) -> TaskId {
    format!("{}-{}-p{}", job_id, stage_id, partition)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub dag: Dag,
    pub state: JobState,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    pub tasks: BTreeMap<TaskId, JobTask>,

    /// Fracción de tareas DONE, en [0, 1].
    pub progress: f32,
}

impl Job {
    pub fn new(id: JobId, dag: Dag) -> Self {
        Self {
            id,
            dag,
            state: JobState::Accepted,
            created_at: Utc::now(),
            finished_at: None,
            tasks: BTreeMap::new(),
            progress: 0.0,
        }
    }

    pub fn done_tasks(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Done)
            .count()
    }

    /// progress = DONE / total. Al llegar a 1.0 el job pasa a SUCCEEDED.
    /// Una tarea FAILED no cambia el estado del job.
    pub fn recompute_progress(&mut self) {
        let total = self.tasks.len();
        if total == 0 {
            return;
        }

        let done = self.done_tasks();
        self.progress = done as f32 / total as f32;

        if done == total && self.state != JobState::Succeeded {
            self.state = JobState::Succeeded;
            self.finished_at = Some(Utc::now());
        }
    }
}

/// Tarea lista para despachar, producida por el job manager.
/// No depende de ningún tipo del scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub partition: u32,
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub op: String,

    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Stage;

    fn job_with_tasks(n: u32) -> Job {
        let dag = Dag::from_stages(vec![Stage::new("s", "noop").with_partitions(n as i64)]).unwrap();
        let mut job = Job::new("job-1".into(), dag);
        for p in 0..n {
            let id = task_id("job-1", "s", p);
            job.tasks.insert(id.clone(), JobTask::pending(id, "s".into(), p));
        }
        job
    }

    #[test]
    fn task_ids_are_deterministic() {
        assert_eq!(task_id("job-1", "read", 2), "job-1-read-p2");
    }

    #[test]
    fn failed_tasks_do_not_move_progress_or_state() {
        let mut job = job_with_tasks(2);
        job.state = JobState::Running;
        job.tasks.get_mut("job-1-s-p0").unwrap().status = TaskStatus::Failed;
        job.recompute_progress();

        assert_eq!(job.progress, 0.0);
        assert_eq!(job.state, JobState::Running);
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn all_done_means_succeeded() {
        let mut job = job_with_tasks(2);
        for t in job.tasks.values_mut() {
            t.status = TaskStatus::Done;
        }
        job.recompute_progress();

        assert_eq!(job.progress, 1.0);
        assert_eq!(job.state, JobState::Succeeded);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn statuses_serialize_upper_case() {
        assert_eq!(serde_json::to_value(TaskStatus::Done).unwrap(), "DONE");
        assert_eq!(serde_json::to_value(JobState::Succeeded).unwrap(), "SUCCEEDED");
    }
}
