// master/src/state.rs

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::jobs::JobManager;
use crate::queue::TaskQueue;
use crate::registry::WorkerRegistry;
use crate::scheduler::{QueueSink, Scheduler};

/// Componentes compartidos del master. Cada uno protege su propio estado.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobManager>,
    pub registry: Arc<WorkerRegistry>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(config: SchedulerConfig) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let registry = Arc::new(WorkerRegistry::new());

        // el job manager sólo ve la capacidad de encolar
        let jobs = Arc::new(JobManager::new(Arc::new(QueueSink::new(queue.clone()))));

        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            jobs.clone(),
            queue,
            config,
        ));

        Self {
            jobs,
            registry,
            scheduler,
        }
    }
}
