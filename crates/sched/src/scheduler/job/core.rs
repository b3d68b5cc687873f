use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tasket_core::JobConfig;
use tracing::{debug, error, info, warn};

use crate::scheduler::clock::{Clock, SystemClock};
use crate::scheduler::metrics::JobMetrics;
use crate::scheduler::pending::PendingTasks;
use crate::scheduler::resolver::{HostResolver, SystemResolver};
use crate::scheduler::task::{JobError, Task, TaskRun, TaskScheduler};
use crate::scheduler::types::{JobId, JobReport, StatusUpdate, TaskId, TaskLaunch};

/// A job as seen by the cluster scheduler.
pub trait Job: Send {
    fn id(&self) -> JobId;

    /// Creation time.
    fn start(&self) -> DateTime<Utc>;

    /// Pick at most one task to run on `host`.
    fn slave_offer(&mut self, host: &str, available_cpus: u32) -> Option<TaskLaunch>;

    /// React to a status report for one of this job's tasks.
    fn status_update(&mut self, update: StatusUpdate) -> Result<(), JobError>;

    /// Whether the job reached a terminal state (all tasks done, or aborted).
    fn is_finished(&self) -> bool;

    fn is_failed(&self) -> bool;
}

/// Per-index scheduling state.
#[derive(Debug, Default)]
pub(super) struct TaskSlot {
    /// An attempt is outstanding.
    pub(super) launched: bool,
    /// Terminal. Never cleared.
    pub(super) finished: bool,
    /// FAILED and LOST reports so far.
    pub(super) num_failures: u32,
    /// Hosts this index was already matched against.
    pub(super) blacklist: HashSet<String>,
    pub(super) run: TaskRun,
}

impl TaskSlot {
    /// Candidate for launch on `host`.
    pub(super) fn is_pending_for(&self, host: &str) -> bool {
        !self.launched && !self.finished && !self.blacklist.contains(host)
    }
}

/// A job made of independent tasks.
pub struct SimpleJob {
    pub(super) id: JobId,
    pub(super) start: DateTime<Utc>,
    pub(super) config: JobConfig,
    pub(super) sched: Arc<dyn TaskScheduler>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) resolver: Arc<dyn HostResolver>,
    pub(super) tasks: Vec<Arc<dyn Task>>,
    pub(super) slots: Vec<TaskSlot>,
    /// Launched task id -> index. Entries are never removed.
    pub(super) tid_to_index: HashMap<TaskId, usize>,
    pub(super) pending: PendingTasks,
    pub(super) tasks_launched: usize,
    pub(super) tasks_finished: usize,
    pub(super) total_used: Duration,
    /// Last launch that honored locality; opens the locality-wait window.
    pub(super) last_preferred_launch: DateTime<Utc>,
    pub(super) failed: bool,
    pub(super) cause_of_failure: Option<String>,
    pub(super) metrics: JobMetrics,
}

/// Builder for [`SimpleJob`]. Clock and resolver default to the system ones.
pub struct SimpleJobBuilder {
    id: JobId,
    sched: Arc<dyn TaskScheduler>,
    tasks: Vec<Arc<dyn Task>>,
    config: JobConfig,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn HostResolver>,
}

impl SimpleJobBuilder {
    pub fn config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn build(self) -> SimpleJob {
        let now = self.clock.now();
        let num_tasks = self.tasks.len();
        let mut job = SimpleJob {
            id: self.id,
            start: now,
            config: self.config,
            sched: self.sched,
            clock: self.clock,
            resolver: self.resolver,
            tasks: self.tasks,
            slots: (0..num_tasks).map(|_| TaskSlot::default()).collect(),
            tid_to_index: HashMap::new(),
            pending: PendingTasks::new(),
            tasks_launched: 0,
            tasks_finished: 0,
            total_used: Duration::ZERO,
            last_preferred_launch: now,
            failed: false,
            cause_of_failure: None,
            metrics: JobMetrics::new(self.id, num_tasks),
        };
        for index in 0..num_tasks {
            job.add_pending_task(index);
        }
        debug!(job_id = job.id, num_tasks, "job created");
        job
    }
}

impl SimpleJob {
    /// Start building a job over `tasks`, reporting to `sched`.
    pub fn builder(
        id: JobId,
        sched: Arc<dyn TaskScheduler>,
        tasks: Vec<Arc<dyn Task>>,
    ) -> SimpleJobBuilder {
        SimpleJobBuilder {
            id,
            sched,
            tasks,
            config: JobConfig::default(),
            clock: Arc::new(SystemClock),
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Create a job with the system clock and resolver.
    pub fn new(
        id: JobId,
        sched: Arc<dyn TaskScheduler>,
        tasks: Vec<Arc<dyn Task>>,
        config: JobConfig,
    ) -> Self {
        Self::builder(id, sched, tasks).config(config).build()
    }

    /// Put task `index` back into every pending index it belongs to.
    pub fn add_pending_task(&mut self, index: usize) {
        let preferred = self.tasks[index].preferred_locations();
        self.pending.add(index, &preferred);
    }

    /// Abort the job. Terminal: later offers are declined and later status
    /// updates ignored.
    pub fn abort(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.failed || self.tasks_finished == self.num_tasks() {
            warn!(job_id = self.id, %message, "abort ignored, job already finished");
            return;
        }
        error!("abort the job {}: {}", self.id, message);
        self.failed = true;
        self.cause_of_failure = Some(message);
        let report = self.report();
        self.sched.job_finished(&report);
        self.sched.shutdown();
    }

    /// Report success once the last task is accounted for.
    pub(super) fn finish_if_complete(&mut self) {
        if self.tasks_finished != self.num_tasks() {
            return;
        }
        let used: Vec<Duration> = self.slots.iter().map(|s| s.run.used).collect();
        let min = used.iter().min().copied().unwrap_or_default();
        let max = used.iter().max().copied().unwrap_or_default();
        let avg = if used.is_empty() {
            Duration::ZERO
        } else {
            used.iter().sum::<Duration>() / used.len() as u32
        };
        let max_tried = self.slots.iter().map(|s| s.run.tried).max().unwrap_or(0);
        let report = self.report();
        info!(
            "Job {} finished in {:.2}s: min={:.2}s, avg={:.2}s, max={:.2}s, maxtry={}",
            self.id,
            report.elapsed.as_secs_f64(),
            min.as_secs_f64(),
            avg.as_secs_f64(),
            max.as_secs_f64(),
            max_tried
        );
        self.sched.job_finished(&report);
    }

    /// Snapshot of the job's terminal state.
    pub fn report(&self) -> JobReport {
        JobReport {
            job_id: self.id,
            failed: self.failed,
            cause_of_failure: self.cause_of_failure.clone(),
            tasks_finished: self.tasks_finished,
            num_tasks: self.num_tasks(),
            elapsed: self.elapsed_since(self.start, self.clock.now()),
        }
    }

    pub(super) fn elapsed_since(&self, from: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(from).to_std().unwrap_or_default()
    }

    pub(super) fn index_of(&self, tid: TaskId) -> Result<usize, JobError> {
        self.tid_to_index.get(&tid).copied().ok_or_else(|| {
            warn!(job_id = self.id, tid, "status update for unknown task");
            JobError::UnknownTask(tid)
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn tasks_launched(&self) -> usize {
        self.tasks_launched
    }

    pub fn tasks_finished(&self) -> usize {
        self.tasks_finished
    }

    /// Sum of measured durations of finished tasks.
    pub fn total_used(&self) -> Duration {
        self.total_used
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn cause_of_failure(&self) -> Option<&str> {
        self.cause_of_failure.as_deref()
    }

    pub fn task_run(&self, index: usize) -> Option<&TaskRun> {
        self.slots.get(index).map(|s| &s.run)
    }

    pub fn num_failures(&self, index: usize) -> Option<u32> {
        self.slots.get(index).map(|s| s.num_failures)
    }

    pub fn is_launched(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.launched)
    }

    pub fn is_task_finished(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.finished)
    }

    #[cfg(test)]
    pub(super) fn is_blacklisted(&self, index: usize, host: &str) -> bool {
        self.slots.get(index).is_some_and(|s| s.blacklist.contains(host))
    }

    pub fn pending(&self) -> &PendingTasks {
        &self.pending
    }

    pub fn metrics(&self) -> JobMetrics {
        self.metrics.clone()
    }
}

impl Job for SimpleJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn start(&self) -> DateTime<Utc> {
        self.start
    }

    fn slave_offer(&mut self, host: &str, available_cpus: u32) -> Option<TaskLaunch> {
        SimpleJob::slave_offer(self, host, available_cpus)
    }

    fn status_update(&mut self, update: StatusUpdate) -> Result<(), JobError> {
        SimpleJob::status_update(self, update)
    }

    fn is_finished(&self) -> bool {
        self.failed || self.tasks_finished == self.num_tasks()
    }

    fn is_failed(&self) -> bool {
        self.failed
    }
}
