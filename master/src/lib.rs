pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use config::{LivenessConfig, MasterConfig, SchedulerConfig};
pub use error::{ConfigError, DispatchError, JobError};
pub use jobs::{JobManager, TaskSink};
pub use queue::{TaskQueue, TaskSpec};
pub use registry::WorkerRegistry;
pub use scheduler::{QueueSink, Scheduler};
pub use state::AppState;
