//! offer-sim: replay a placement scenario against one job.
//!
//! Reads a TOML scenario describing hosts (with aliases) and tasks (with
//! preferred hosts and injected failures), then drives a `SimpleJob` tick by
//! tick on a manual clock: every host is offered each tick, and tasks launched
//! on one tick report back on the next. Prints the job metrics and the final
//! report as JSON.
//!
//! ```toml
//! ticks = 200
//! tick_seconds = 1
//!
//! [job]
//! locality_wait_seconds = 3
//!
//! [[hosts]]
//! name = "node1.cluster.local"
//! aliases = ["node1"]
//! addresses = ["10.0.0.1"]
//!
//! [[tasks]]
//! preferred = ["node1"]
//! fail_times = 1
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use tasket_core::JobConfig;
use tasket_sched::scheduler::{
    FailureReason, Job, JobReport, ManualClock, ResolvedHost, SimpleJob, StaticResolver,
    StatusUpdate, Task, TaskId, TaskOutcome, TaskScheduler,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Replay a task placement scenario against the job engine.
#[derive(Parser, Debug)]
#[command(name = "offer-sim", version, about)]
struct Cli {
    /// Path to the scenario TOML file.
    #[arg(long, env = "TASKET_SCENARIO")]
    scenario: PathBuf,

    /// Override the scenario's tick budget.
    #[arg(long)]
    ticks: Option<u64>,

    /// Slots advertised by every offer.
    #[arg(long, default_value_t = 1)]
    cpus: u32,
}

// ── Scenario ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default = "default_ticks")]
    ticks: u64,
    #[serde(default = "default_tick_seconds")]
    tick_seconds: u64,
    #[serde(default)]
    job: Option<JobConfig>,
    hosts: Vec<HostEntry>,
    tasks: Vec<TaskPlan>,
}

fn default_ticks() -> u64 { 1000 }
fn default_tick_seconds() -> u64 { 1 }

#[derive(Debug, Deserialize)]
struct HostEntry {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskPlan {
    #[serde(default)]
    preferred: Vec<String>,
    /// Attempts that report LOST before one succeeds.
    #[serde(default)]
    fail_times: u32,
    /// Report a fetch failure instead of finishing.
    #[serde(default)]
    fetch_failure: bool,
}

struct SimTask {
    id: TaskId,
    preferred: Vec<String>,
}

impl Task for SimTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn preferred_locations(&self) -> Vec<String> {
        self.preferred.clone()
    }
}

/// Logs what the job reports and keeps the final report.
#[derive(Default)]
struct LoggingScheduler {
    report: Mutex<Option<JobReport>>,
}

impl TaskScheduler for LoggingScheduler {
    fn task_ended(
        &self,
        task: &Arc<dyn Task>,
        outcome: TaskOutcome,
        _result: Option<Value>,
        _update: Option<Value>,
    ) {
        info!(tid = task.id(), ?outcome, "task ended");
    }

    fn job_finished(&self, report: &JobReport) {
        info!(job_id = report.job_id, failed = report.failed, "job finished");
        if let Ok(mut slot) = self.report.lock() {
            *slot = Some(report.clone());
        }
    }

    fn request_more_resources(&self) {
        info!("more resources requested");
    }

    fn shutdown(&self) {
        warn!("shutdown requested");
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    let scenario: Scenario = toml::from_str(&content)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    if scenario.hosts.is_empty() {
        bail!("scenario has no hosts");
    }
    Ok(scenario)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let scenario = load_scenario(&cli.scenario)?;
    let config = match scenario.job.clone() {
        Some(config) => {
            config.validate()?;
            config
        }
        None => JobConfig::from_env()?,
    };
    config.log_summary();

    let mut resolver = StaticResolver::new();
    for host in &scenario.hosts {
        resolver.add_host(ResolvedHost {
            canonical: host.name.clone(),
            aliases: host.aliases.clone(),
            addresses: host.addresses.clone(),
        });
    }

    let tasks: Vec<Arc<dyn Task>> = scenario
        .tasks
        .iter()
        .enumerate()
        .map(|(i, plan)| {
            Arc::new(SimTask { id: i as TaskId, preferred: plan.preferred.clone() })
                as Arc<dyn Task>
        })
        .collect();

    let sched = Arc::new(LoggingScheduler::default());
    let clock = Arc::new(ManualClock::default());
    let mut job = SimpleJob::builder(1, sched.clone(), tasks)
        .config(config)
        .clock(clock.clone())
        .resolver(Arc::new(resolver))
        .build();

    let ticks = cli.ticks.unwrap_or(scenario.ticks);
    let mut failures_left: HashMap<usize, u32> = scenario
        .tasks
        .iter()
        .enumerate()
        .map(|(i, plan)| (i, plan.fail_times))
        .collect();
    let mut in_flight: Vec<(TaskId, usize)> = Vec::new();

    info!(ticks, hosts = scenario.hosts.len(), tasks = scenario.tasks.len(), "simulation starting");
    for tick in 0..ticks {
        for (tid, index) in std::mem::take(&mut in_flight) {
            let plan = &scenario.tasks[index];
            let remaining = failures_left.entry(index).or_default();
            let update = if *remaining > 0 {
                *remaining -= 1;
                StatusUpdate::lost(tid)
            } else if plan.fetch_failure {
                StatusUpdate::failed(
                    tid,
                    FailureReason::FetchFailed {
                        server_uri: format!("sim://upstream/{index}"),
                        shuffle_id: 0,
                        map_id: index as u64,
                        reduce_id: 0,
                    },
                )
            } else {
                StatusUpdate::finished(tid)
            };
            job.status_update(update)?;
        }

        if job.is_finished() {
            info!(tick, "job reached a terminal state");
            break;
        }

        for host in &scenario.hosts {
            if let Some(launch) = job.slave_offer(&host.name, cli.cpus) {
                in_flight.push((launch.task_id(), launch.index));
            }
        }
        clock.advance(Duration::from_secs(scenario.tick_seconds));
    }

    if !job.is_finished() {
        warn!(ticks, "tick budget exhausted before the job finished");
    }

    let metrics = job.metrics();
    info!(
        fresh = metrics.fresh_launches(),
        speculative = metrics.speculative_launches,
        "launch summary"
    );

    let report = sched.report.lock().ok().and_then(|r| (*r).clone()).unwrap_or_else(|| job.report());
    let output = serde_json::json!({
        "metrics": metrics,
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
