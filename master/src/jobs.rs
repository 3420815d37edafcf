// master/src/jobs.rs

use chrono::Utc;
use common::{task_id, Dag, Job, JobId, JobState, JobTask, TaskAssignment};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::info;
use uuid::Uuid;

use crate::error::JobError;

/// Destino de las tareas listas para correr. El job manager sólo conoce
/// esta capacidad, nunca al scheduler.
pub trait TaskSink: Send + Sync {
    fn enqueue(&self, assignment: TaskAssignment);
}

/// Dueño de todos los jobs y sus tareas. Un único lock cubre el mapa
/// completo, lecturas incluidas.
pub struct JobManager {
    jobs: Mutex<HashMap<JobId, Job>>,
    sink: Arc<dyn TaskSink>,
}

impl JobManager {
    pub fn new(sink: Arc<dyn TaskSink>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra un job nuevo con el mapa de tareas vacío.
    pub fn add(&self, mut job: Job) {
        job.tasks.clear();
        self.lock().insert(job.id.clone(), job);
    }

    /// Expande los stages fuente del job en una tarea por partición y
    /// deja el job en RUNNING. No encola nada: devuelve los assignments.
    pub fn build_tasks(&self, job_id: &str) -> Result<Vec<TaskAssignment>, JobError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))?;

        let mut out = Vec::new();

        for stage in job.dag.sources() {
            for p in 0..stage.partition_count() {
                let tid = task_id(&job.id, &stage.id, p);

                job.tasks.insert(
                    tid.clone(),
                    JobTask::pending(tid.clone(), stage.id.clone(), p),
                );

                out.push(TaskAssignment {
                    job_id: job.id.clone(),
                    task_id: tid,
                    stage_id: stage.id.clone(),
                    partition: p,
                    attempts: 0,
                    op: stage.op.clone(),
                    params: stage.params.clone(),
                });
            }
        }

        job.state = JobState::Running;

        // DAG sin stages: no hay nada que correr
        if job.tasks.is_empty() {
            job.progress = 1.0;
            job.state = JobState::Succeeded;
            job.finished_at = Some(Utc::now());
        }

        Ok(out)
    }

    /// Crea el job, expande sus tareas y las entrega al sink.
    pub fn submit(&self, dag: Dag) -> JobId {
        let job_id = new_job_id();
        self.add(Job::new(job_id.clone(), dag));

        // el job se acaba de insertar: build_tasks no puede fallar
        let assignments = self.build_tasks(&job_id).unwrap_or_default();
        info!(
            "job {} aceptado con {} tareas iniciales",
            job_id,
            assignments.len()
        );

        for a in assignments {
            self.sink.enqueue(a);
        }

        job_id
    }

    /// Aplica `update` a una tarea y recalcula el progreso del job.
    pub fn update_task<F>(&self, job_id: &str, task_id: &str, update: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut JobTask),
    {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))?;

        let task = job
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| JobError::TaskNotFound {
                job_id: job_id.to_string(),
                task_id: task_id.to_string(),
            })?;

        update(task);

        let was_succeeded = job.state == JobState::Succeeded;
        job.recompute_progress();
        if !was_succeeded && job.state == JobState::Succeeded {
            info!("job {} terminó (SUCCEEDED)", job_id);
        }

        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.lock().get(job_id).cloned()
    }

    pub fn get_task(&self, job_id: &str, task_id: &str) -> Result<JobTask, JobError> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))?;

        job.tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| JobError::TaskNotFound {
                job_id: job_id.to_string(),
                task_id: task_id.to_string(),
            })
    }

    /// Jobs ordenados por fecha de creación.
    pub fn list(&self) -> Vec<Job> {
        let mut out: Vec<Job> = self.lock().values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

fn new_job_id() -> JobId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "job-{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &suffix[..8]
    )
}
