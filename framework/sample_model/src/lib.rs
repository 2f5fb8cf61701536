use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::fmt::{Display, Formatter};

mod store;

pub use store::{
    load_result_store, store_path, FailureRecord, LoadError, ResultStore, StoreError,
    StoreRecord, STORE_FILE_EXTENSION,
};

/// Identity of a scenario, the project it runs against and the label of the command.
///
/// Ordering is lexicographic by project and then label, which is also the order that the
/// catalog yields scenarios in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId {
    pub project: String,
    pub label: String,
}

impl ScenarioId {
    pub fn new(project: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            label: label.into(),
        }
    }
}

impl Display for ScenarioId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.label)
    }
}

/// How a scenario was measured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementConfig {
    /// The command after template placeholders were filled in
    pub command: String,
    /// Number of timed runs
    pub runs: u32,
    /// Number of untimed runs before the timed runs
    pub warmup: u32,
}

impl MeasurementConfig {
    /// Compute a fingerprint for this configuration of the given scenario
    ///
    /// Two samples are only comparable if they were measured with the same fingerprint. It
    /// covers the
    ///     - Project name
    ///     - Command label
    ///     - Rendered command
    ///     - Run and warmup counts
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self, scenario: &ScenarioId) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, scenario.project.as_bytes());
        Digest::update(&mut hasher, scenario.label.as_bytes());
        Digest::update(&mut hasher, self.command.as_bytes());
        Digest::update(&mut hasher, self.runs.to_le_bytes());
        Digest::update(&mut hasher, self.warmup.to_le_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// One timing measurement of a scenario under a branch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// The branch label this sample was measured for, e.g. `baseline` or `dev`
    pub branch: String,
    pub scenario: ScenarioId,
    /// The id of the `measure` invocation that produced this sample
    ///
    /// All samples collected by one invocation share the same id.
    pub run_id: String,
    /// When the measurement finished, as a Unix timestamp in seconds
    pub measured_at: i64,
    pub command: String,
    pub runs: u32,
    pub warmup: u32,
    /// See [MeasurementConfig::fingerprint]
    pub fingerprint: String,
    /// Elapsed wall-clock time of each timed run, in seconds, in the order they were observed
    pub times: Vec<f64>,
    pub mean: f64,
    /// Sample standard deviation (n - 1), zero when there are fewer than two observations
    pub stddev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Exit status of the measured command
    pub exit_status: i32,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SampleError {
    #[error("No timing observations for {0}")]
    NoObservations(ScenarioId),
    #[error("Timing observation {value} for {scenario} is not a finite, non-negative number")]
    InvalidObservation { scenario: ScenarioId, value: f64 },
}

impl Sample {
    /// Create a sample from raw observations, deriving the summary statistics.
    pub fn new(
        branch: String,
        scenario: ScenarioId,
        run_id: String,
        measured_at: i64,
        config: MeasurementConfig,
        times: Vec<f64>,
        exit_status: i32,
    ) -> Result<Self, SampleError> {
        if times.is_empty() {
            return Err(SampleError::NoObservations(scenario));
        }
        if let Some(value) = times.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(SampleError::InvalidObservation {
                scenario,
                value: *value,
            });
        }

        let stats = Stats::from_observations(&times);
        let fingerprint = config.fingerprint(&scenario);

        Ok(Self {
            branch,
            scenario,
            run_id,
            measured_at,
            command: config.command,
            runs: config.runs,
            warmup: config.warmup,
            fingerprint,
            times,
            mean: stats.mean,
            stddev: stats.stddev,
            median: stats.median,
            min: stats.min,
            max: stats.max,
            exit_status,
        })
    }
}

struct Stats {
    mean: f64,
    stddev: f64,
    median: f64,
    min: f64,
    max: f64,
}

impl Stats {
    /// Callers guarantee at least one observation.
    fn from_observations(times: &[f64]) -> Self {
        let n = times.len() as f64;
        let mean = times.iter().sum::<f64>() / n;
        let stddev = if times.len() < 2 {
            0.0
        } else {
            let sum_sq = times.iter().map(|t| (t - mean).powi(2)).sum::<f64>();
            (sum_sq / (n - 1.0)).sqrt()
        };

        let mut sorted = times.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self {
            mean,
            stddev,
            median,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Check that a branch label can be used to name a result store file.
///
/// Labels are limited to ASCII letters, digits, `-`, `_` and `.` and may not start with a `.`.
pub fn parse_branch_label(label: &str) -> anyhow::Result<String> {
    if label.is_empty() {
        anyhow::bail!("Branch label must not be empty");
    }
    if label.starts_with('.') {
        anyhow::bail!("Branch label must not start with '.': {label}");
    }
    if let Some(c) = label
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        anyhow::bail!("Branch label contains invalid character '{c}': {label}");
    }

    Ok(label.to_string())
}
