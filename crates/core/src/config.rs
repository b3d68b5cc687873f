use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TasketError;

/// Seconds a job holds out for a locality-preferred placement.
pub const LOCALITY_WAIT_SECONDS: u64 = 5;
/// Failures a single task index may accumulate before the job aborts.
pub const MAX_TASK_FAILURES: u32 = 4;
/// Slots one task occupies. Not enforced against offers here.
pub const CPUS_PER_TASK: u32 = 1;
/// Fraction of finished tasks after which stragglers are relaunched.
pub const SPECULATION_QUANTILE: f64 = 0.75;
/// A running task is straggling once it exceeds this multiple of the mean duration.
pub const SPECULATION_MULTIPLIER: f64 = 2.0;
/// Minimum runtime before a task can be treated as straggling.
pub const SPECULATION_MIN_SECONDS: u64 = 10;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|v| v.parse().ok())
}

// ── Job config ────────────────────────────────────────────────

/// Placement and retry tuning for a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Locality wait window in seconds.
    #[serde(default = "default_locality_wait")]
    pub locality_wait_seconds: u64,
    /// Retry budget per task index.
    #[serde(default = "default_max_task_failures")]
    pub max_task_failures: u32,
    #[serde(default = "default_cpus_per_task")]
    pub cpus_per_task: u32,
    /// Finished fraction that enables speculative relaunch.
    #[serde(default = "default_speculation_quantile")]
    pub speculation_quantile: f64,
    #[serde(default = "default_speculation_multiplier")]
    pub speculation_multiplier: f64,
    /// Runtime floor for straggler detection, in seconds.
    #[serde(default = "default_speculation_min_seconds")]
    pub speculation_min_seconds: u64,
}

fn default_locality_wait() -> u64 { LOCALITY_WAIT_SECONDS }
fn default_max_task_failures() -> u32 { MAX_TASK_FAILURES }
fn default_cpus_per_task() -> u32 { CPUS_PER_TASK }
fn default_speculation_quantile() -> f64 { SPECULATION_QUANTILE }
fn default_speculation_multiplier() -> f64 { SPECULATION_MULTIPLIER }
fn default_speculation_min_seconds() -> u64 { SPECULATION_MIN_SECONDS }

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            locality_wait_seconds: default_locality_wait(),
            max_task_failures: default_max_task_failures(),
            cpus_per_task: default_cpus_per_task(),
            speculation_quantile: default_speculation_quantile(),
            speculation_multiplier: default_speculation_multiplier(),
            speculation_min_seconds: default_speculation_min_seconds(),
        }
    }
}

impl JobConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, TasketError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TasketError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment (call after `.env` is loaded
    /// or let this load it).
    pub fn from_env() -> Result<Self, TasketError> {
        load_dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn locality_wait(&self) -> Duration {
        Duration::from_secs(self.locality_wait_seconds)
    }

    pub fn speculation_min_runtime(&self) -> Duration {
        Duration::from_secs(self.speculation_min_seconds)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Job config loaded:");
        tracing::info!("  locality:    wait={}s", self.locality_wait_seconds);
        tracing::info!("  retries:     max_task_failures={}", self.max_task_failures);
        tracing::info!("  slots:       cpus_per_task={}", self.cpus_per_task);
        tracing::info!(
            "  speculation: quantile={}, multiplier={}, min={}s",
            self.speculation_quantile,
            self.speculation_multiplier,
            self.speculation_min_seconds
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Convention: `TASKET_<FIELD>` overrides `<field>`. Values that do not
    /// parse are ignored.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parsed("TASKET_LOCALITY_WAIT_SECONDS") {
            self.locality_wait_seconds = v;
        }
        if let Some(v) = env_parsed("TASKET_MAX_TASK_FAILURES") {
            self.max_task_failures = v;
        }
        if let Some(v) = env_parsed("TASKET_CPUS_PER_TASK") {
            self.cpus_per_task = v;
        }
        if let Some(v) = env_parsed("TASKET_SPECULATION_QUANTILE") {
            self.speculation_quantile = v;
        }
        if let Some(v) = env_parsed("TASKET_SPECULATION_MULTIPLIER") {
            self.speculation_multiplier = v;
        }
        if let Some(v) = env_parsed("TASKET_SPECULATION_MIN_SECONDS") {
            self.speculation_min_seconds = v;
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), TasketError> {
        if self.cpus_per_task == 0 {
            return Err(TasketError::Config(
                "cpus_per_task must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.speculation_quantile) {
            return Err(TasketError::Config(format!(
                "speculation_quantile {} must be in [0, 1)",
                self.speculation_quantile
            )));
        }
        if self.speculation_multiplier.is_nan() || self.speculation_multiplier < 1.0 {
            return Err(TasketError::Config(format!(
                "speculation_multiplier {} must be at least 1",
                self.speculation_multiplier
            )));
        }
        Ok(())
    }
}
