use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::scheduler::resolver::ResolvedHost;
use crate::scheduler::types::{Locality, TaskLaunch};

use super::core::{SimpleJob, TaskSlot};

/// First index in `list` still pending for `host`. The chosen index gets
/// `host` added to its blacklist.
pub(super) fn find_task_from_list(
    slots: &mut [TaskSlot],
    list: &[usize],
    host: &str,
) -> Option<usize> {
    for &index in list {
        let slot = &mut slots[index];
        if slot.is_pending_for(host) {
            slot.blacklist.insert(host.to_string());
            return Some(index);
        }
    }
    None
}

impl SimpleJob {
    /// Pending indexes preferring any name `host` is known by.
    ///
    /// Resolution failures fall back to the literal name.
    pub fn pending_tasks_for_host(&self, host: &str) -> Vec<usize> {
        let resolved = match self.resolver.resolve(host) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(host, error = %e, "host resolution failed, matching literal name only");
                ResolvedHost::literal(host)
            }
        };

        let mut names: Vec<&str> = vec![host];
        for name in resolved.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        self.pending.for_hosts(names)
    }

    /// Three-tier search: tasks preferring `host`, then tasks without
    /// preference, then (unless `local_only`) anything pending.
    pub fn find_task(&mut self, host: &str, local_only: bool) -> Option<(usize, Locality)> {
        let local = self.pending_tasks_for_host(host);
        if let Some(index) = find_task_from_list(&mut self.slots, &local, host) {
            return Some((index, Locality::Preferred));
        }
        if let Some(index) = find_task_from_list(&mut self.slots, self.pending.no_prefs(), host) {
            return Some((index, Locality::Preferred));
        }
        if !local_only {
            if let Some(index) = find_task_from_list(&mut self.slots, self.pending.all(), host) {
                return Some((index, Locality::NonPreferred));
            }
        }
        None
    }

    /// Respond to an offer of one host by finding a task to run there.
    ///
    /// `available_cpus` is not checked against `cpus_per_task`; the cluster
    /// scheduler only offers hosts with room.
    pub fn slave_offer(&mut self, host: &str, available_cpus: u32) -> Option<TaskLaunch> {
        if self.failed {
            debug!(job_id = self.id, host, "offer declined, job aborted");
            return None;
        }
        if self.tasks_launched >= self.num_tasks() {
            return self.speculative_offer(host);
        }

        let now = self.clock.now();
        let local_only =
            self.elapsed_since(self.last_preferred_launch, now) < self.config.locality_wait();
        let Some((index, locality)) = self.find_task(host, local_only) else {
            debug!(job_id = self.id, host, local_only, "no task found");
            return None;
        };

        let task = Arc::clone(&self.tasks[index]);
        let slot = &mut self.slots[index];
        slot.launched = true;
        slot.run.start = Some(now);
        slot.run.tried = 0;
        slot.run.host = Some(host.to_string());
        self.tid_to_index.insert(task.id(), index);
        self.tasks_launched += 1;
        if locality.is_preferred() {
            self.last_preferred_launch = now;
        }
        self.metrics.record_launch(locality);

        debug!(
            "Starting task {}:{} as TID {} on slave {} ({:?}, {} cpus offered)",
            self.id,
            index,
            task.id(),
            host,
            locality,
            available_cpus
        );
        Some(TaskLaunch { task, index, attempt: 0, locality })
    }

    /// Every task has an attempt outstanding. Once most of them finished,
    /// relaunch the longest-running one if it is straggling.
    fn speculative_offer(&mut self, host: &str) -> Option<TaskLaunch> {
        let num_tasks = self.num_tasks();
        // No finished task means no mean duration to compare against.
        if self.tasks_finished == 0
            || self.tasks_finished >= num_tasks
            || self.tasks_finished as f64 <= num_tasks as f64 * self.config.speculation_quantile
        {
            return None;
        }

        let avg = self.total_used / self.tasks_finished as u32;
        let now = self.clock.now();
        let (index, started) = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.launched && !s.finished)
            .filter_map(|(i, s)| s.run.start.map(|t| (i, t)))
            .min_by_key(|&(_, t)| t)?;

        let used = self.elapsed_since(started, now);
        let threshold =
            Duration::try_from_secs_f64(avg.as_secs_f64() * self.config.speculation_multiplier)
                .unwrap_or(Duration::MAX);
        if used <= threshold || used <= self.config.speculation_min_runtime() {
            return None;
        }

        let max_failures = self.config.max_task_failures;
        let task = Arc::clone(&self.tasks[index]);
        let slot = &mut self.slots[index];
        if slot.run.tried <= max_failures {
            slot.run.start = Some(now);
            slot.run.tried += 1;
            let attempt = slot.run.tried;
            self.metrics.record_launch(Locality::Speculative);
            warn!(
                "re-submit task {} (TID {}) for timeout {:.2}s on {}",
                index,
                task.id(),
                used.as_secs_f64(),
                host
            );
            return Some(TaskLaunch { task, index, attempt, locality: Locality::Speculative });
        }

        error!("task {} timeout, aborting job {}", index, self.id);
        self.abort(format!("task {} timeout", index));
        None
    }
}
