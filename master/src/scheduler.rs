// master/src/scheduler.rs

use common::{
    JobTask, Record, SchedulerStats, TaskAssignment, TaskRequest, TaskResponse, TaskStatus,
    WorkerId, WorkerInfo,
};
use reqwest::Client;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::DispatchError;
use crate::jobs::{JobManager, TaskSink};
use crate::queue::{TaskQueue, TaskSpec};
use crate::registry::WorkerRegistry;

type ActiveTasks = Arc<Mutex<HashMap<WorkerId, usize>>>;

fn lock_active(active: &ActiveTasks) -> MutexGuard<'_, HashMap<WorkerId, usize>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/* --------- Puente job manager -> cola --------- */

/// Convierte los `TaskAssignment` del job manager en `TaskSpec` y los
/// encola. Es el `TaskSink` que recibe el job manager al construirse.
#[derive(Clone)]
pub struct QueueSink {
    queue: Arc<TaskQueue>,
}

impl QueueSink {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    pub fn enqueue_assignment(&self, assignment: TaskAssignment) {
        debug!("encolando tarea {}", assignment.task_id);
        self.queue.push(TaskSpec::from(assignment));
    }
}

impl TaskSink for QueueSink {
    fn enqueue(&self, assignment: TaskAssignment) {
        self.enqueue_assignment(assignment);
    }
}

/* --------- Scheduler --------- */

pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    jobs: Arc<JobManager>,
    queue: Arc<TaskQueue>,
    client: Client,
    // tareas en vuelo por worker; lock propio, independiente del registry
    active: ActiveTasks,
    config: SchedulerConfig,
}

/// Cupo tomado en el contador de un worker; se libera al soltarse.
struct ActiveSlot {
    active: ActiveTasks,
    worker_id: WorkerId,
}

impl ActiveSlot {
    fn acquire(active: &ActiveTasks, worker_id: &str) -> Self {
        *lock_active(active).entry(worker_id.to_string()).or_insert(0) += 1;
        Self {
            active: active.clone(),
            worker_id: worker_id.to_string(),
        }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let mut active = lock_active(&self.active);
        if let Some(n) = active.get_mut(&self.worker_id) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                active.remove(&self.worker_id);
            }
        }
    }
}

impl Scheduler {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        jobs: Arc<JobManager>,
        queue: Arc<TaskQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            jobs,
            queue,
            client: Client::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Lanza el loop de despacho en su propia tarea.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Loop principal: pop -> elegir worker -> despachar sin esperar.
    pub async fn run(self: Arc<Self>) {
        info!(
            "scheduler iniciado (max_attempts={}, retry_delay={:?})",
            self.config.max_attempts, self.config.retry_delay
        );
        loop {
            self.step().await;
        }
    }

    async fn step(self: &Arc<Self>) {
        // 1) esperar trabajo
        let task = self.queue.pop().await;

        // 2) elegir worker UP con menos carga
        let Some(worker) = self.pick_worker() else {
            warn!("no hay workers UP, re-encolando tarea {}", task.task_id);
            sleep(self.config.no_worker_backoff).await;
            self.queue.push(task);
            return;
        };

        // 3) tomar el cupo antes de lanzar la tarea y seguir sin esperar
        let slot = ActiveSlot::acquire(&self.active, &worker.id);
        debug!(
            "asignando tarea {} (attempt={}) al worker {}",
            task.task_id, task.attempts, worker.id
        );

        tokio::spawn(self.clone().dispatch(worker, task, slot));
    }

    /// Worker UP con menos tareas en vuelo.
    pub fn pick_worker(&self) -> Option<WorkerInfo> {
        let workers = self.registry.list();
        let active = lock_active(&self.active);
        select_least_loaded(workers, &active)
    }

    pub fn active_tasks(&self, worker_id: &str) -> usize {
        lock_active(&self.active)
            .get(worker_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued_tasks: self.queue.len(),
            active_tasks: lock_active(&self.active)
                .iter()
                .map(|(id, n)| (id.clone(), *n))
                .collect(),
        }
    }

    // 4) unidad de despacho: una por tarea
    async fn dispatch(self: Arc<Self>, worker: WorkerInfo, task: TaskSpec, slot: ActiveSlot) {
        self.record(&task, |t| {
            t.status = TaskStatus::Running;
            t.assigned_to = Some(worker.id.clone());
        });

        match self.send(&worker, &task).await {
            Ok(output) => {
                let records = output.as_ref().map_or(0, Vec::len);
                self.record(&task, |t| {
                    t.status = TaskStatus::Done;
                    t.assigned_to = Some(worker.id.clone());
                    if output.is_some() {
                        t.result = output;
                    }
                });
                drop(slot);

                info!(
                    "tarea {} completada en worker {} ({} registros)",
                    task.task_id, worker.id, records
                );
            }
            Err(e) => {
                drop(slot);
                warn!(
                    "tarea {} falló en worker {}: {}",
                    task.task_id, worker.id, e
                );
                self.handle_failure(&worker, task).await;
            }
        }
    }

    async fn send(
        &self,
        worker: &WorkerInfo,
        task: &TaskSpec,
    ) -> Result<Option<Vec<Record>>, DispatchError> {
        let resp = self
            .client
            .post(task_url(&worker.host))
            .timeout(self.config.dispatch_timeout)
            .json(&request_for(task))
            .send()
            .await
            .map_err(DispatchError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: TaskResponse = resp.json().await.map_err(DispatchError::Envelope)?;
        if !envelope.is_ok() {
            return Err(DispatchError::Rejected(envelope.status));
        }

        Ok(envelope.output)
    }

    async fn handle_failure(&self, worker: &WorkerInfo, mut task: TaskSpec) {
        task.attempts += 1;
        let attempts = task.attempts;

        self.record(&task, |t| {
            t.attempts = attempts;
            t.assigned_to = Some(worker.id.clone());
            t.status = TaskStatus::Failed;
        });

        if attempts < self.config.max_attempts {
            info!(
                "re-encolando tarea {} del job {} (attempt={}/{})",
                task.task_id, task.job_id, attempts, self.config.max_attempts
            );
            sleep(self.config.retry_delay).await;
            self.queue.push(task);
        } else {
            warn!(
                "tarea {} del job {} superó el máximo de intentos ({}), queda FAILED",
                task.task_id, task.job_id, self.config.max_attempts
            );
        }
    }

    fn record<F>(&self, task: &TaskSpec, update: F)
    where
        F: FnOnce(&mut JobTask),
    {
        if let Err(e) = self.jobs.update_task(&task.job_id, &task.task_id, update) {
            warn!("no se pudo actualizar la tarea {}: {}", task.task_id, e);
        }
    }
}

/// Entre los workers UP, el de menor cantidad de tareas activas.
/// Empates: el primero en el orden recibido.
pub fn select_least_loaded(
    workers: Vec<WorkerInfo>,
    active: &HashMap<WorkerId, usize>,
) -> Option<WorkerInfo> {
    workers
        .into_iter()
        .filter(WorkerInfo::is_up)
        .min_by_key(|w| active.get(&w.id).copied().unwrap_or(0))
}

fn task_url(host: &str) -> String {
    let base = host.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/task", base)
    } else {
        format!("http://{}/task", base)
    }
}

fn request_for(task: &TaskSpec) -> TaskRequest {
    TaskRequest {
        job_id: task.job_id.clone(),
        task_id: task.task_id.clone(),
        stage_id: task.stage_id.clone(),
        partition: task.partition,
        op: task.op.clone(),
        params: task.params.clone(),
    }
}
