//! Per-job task placement and fault recovery.
//!
//! A cluster scheduler hands each job a stream of resource offers (one host,
//! some free slots) and task status reports. [`SimpleJob`] answers each offer
//! with at most one task, preferring tasks whose input lives on the offered
//! host, and reacts to completions and failures with retries, speculative
//! relaunch of stragglers, or an abort.
//!
//! A job is not internally synchronized. Drive it from a single control loop,
//! or wrap it in a [`SharedJob`] when offers arrive on several threads.

pub mod clock;
pub mod job;
pub mod metrics;
pub mod pending;
pub mod resolver;
pub mod state;
pub mod task;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use job::{Job, SimpleJob, SimpleJobBuilder};
pub use metrics::JobMetrics;
pub use pending::PendingTasks;
pub use resolver::{HostResolver, ResolvedHost, StaticResolver, SystemResolver};
pub use state::{SharedJob, new_shared_job, with_job};
pub use task::{JobError, Task, TaskRun, TaskScheduler};
pub use types::{
    FailureReason, JobId, JobIdAllocator, JobReport, Locality, StatusUpdate, TaskId, TaskLaunch,
    TaskOutcome, TaskStatus,
};
