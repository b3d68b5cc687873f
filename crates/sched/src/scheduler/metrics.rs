use std::time::Duration;

use serde::Serialize;

use super::types::{JobId, Locality};

/// Operational counters of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobMetrics {
    pub job_id: JobId,
    pub num_tasks: usize,
    /// Fresh launches that honored locality.
    pub preferred_launches: u64,
    /// Fresh launches made after the locality wait elapsed.
    pub non_preferred_launches: u64,
    /// Duplicate attempts of straggling tasks.
    pub speculative_launches: u64,
    /// Tasks that finished successfully.
    pub tasks_succeeded: u64,
    /// FAILED and LOST reports counted against the retry budget.
    pub task_failures: u64,
    pub tasks_killed: u64,
    pub fetch_failures: u64,
    /// Sum of measured durations of finished tasks.
    pub total_task_duration: Duration,
    /// Rolling mean of measured durations.
    pub avg_task_duration: Duration,
    pub min_task_duration: Option<Duration>,
    pub max_task_duration: Option<Duration>,
}

impl JobMetrics {
    pub fn new(job_id: JobId, num_tasks: usize) -> Self {
        Self { job_id, num_tasks, ..Self::default() }
    }

    /// Record a launch.
    pub fn record_launch(&mut self, locality: Locality) {
        match locality {
            Locality::Preferred => self.preferred_launches += 1,
            Locality::NonPreferred => self.non_preferred_launches += 1,
            Locality::Speculative => self.speculative_launches += 1,
        }
    }

    /// Record a successful finish.
    pub fn record_success(&mut self, duration: Duration) {
        self.tasks_succeeded += 1;
        self.total_task_duration += duration;

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.tasks_succeeded;
        self.avg_task_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.min_task_duration = Some(self.min_task_duration.map_or(duration, |m| m.min(duration)));
        self.max_task_duration = Some(self.max_task_duration.map_or(duration, |m| m.max(duration)));
    }

    pub fn record_failure(&mut self) {
        self.task_failures += 1;
    }

    pub fn record_kill(&mut self) {
        self.tasks_killed += 1;
    }

    pub fn record_fetch_failure(&mut self) {
        self.fetch_failures += 1;
    }

    /// Fresh launches of either locality.
    pub fn fresh_launches(&self) -> u64 {
        self.preferred_launches + self.non_preferred_launches
    }
}
