use chrono::{DateTime, Utc};
use perf_gate_sample_model::{Sample, ScenarioId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Dev is significantly slower than baseline
    Regression,
    /// Dev is significantly faster than baseline
    Improvement,
    /// The difference is within noise
    NoChange,
    /// The scenario could not be compared
    Missing,
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Regression => write!(f, "regression"),
            Classification::Improvement => write!(f, "improvement"),
            Classification::NoChange => write!(f, "no change"),
            Classification::Missing => write!(f, "missing"),
        }
    }
}

/// Why a scenario was classified as [Classification::Missing]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissingReason {
    /// Only the baseline store has a sample. Carries the dev failure cause if one was recorded.
    OnlyInBaseline { dev_failure: Option<String> },
    /// Only the dev store has a sample. Carries the baseline failure cause if one was recorded.
    OnlyInDev { baseline_failure: Option<String> },
    /// Neither store has a sample, both recorded a failure
    NotMeasured {
        baseline_failure: String,
        dev_failure: String,
    },
    /// The measured command itself exited with an error so its timings are meaningless
    CommandFailed { branch: String, exit_status: i32 },
    /// The two samples were measured with different commands or run counts
    ConfigurationMismatch {
        baseline_fingerprint: String,
        dev_fingerprint: String,
    },
    /// The statistic could not be computed from the samples
    Ambiguous { detail: String },
}

impl Display for MissingReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::OnlyInBaseline { dev_failure } => {
                write!(f, "no dev sample")?;
                if let Some(cause) = dev_failure {
                    write!(f, ": {cause}")?;
                }
                Ok(())
            }
            MissingReason::OnlyInDev { baseline_failure } => {
                write!(f, "no baseline sample")?;
                if let Some(cause) = baseline_failure {
                    write!(f, ": {cause}")?;
                }
                Ok(())
            }
            MissingReason::NotMeasured {
                baseline_failure,
                dev_failure,
            } => write!(
                f,
                "not measured (baseline: {baseline_failure}; dev: {dev_failure})"
            ),
            MissingReason::CommandFailed {
                branch,
                exit_status,
            } => write!(f, "command exited with {exit_status} on {branch}"),
            MissingReason::ConfigurationMismatch { .. } => {
                write!(f, "measured with different configurations")
            }
            MissingReason::Ambiguous { detail } => write!(f, "ambiguous: {detail}"),
        }
    }
}

/// The statistic that decided a classification, with the thresholds it was tested against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Statistic {
    Dispersion {
        /// Delta in units of the combined standard deviation. Absent when both samples have
        /// zero spread.
        z_score: Option<f64>,
        combined_stddev: f64,
        sigma: f64,
        min_relative_delta: f64,
        decisive_relative_delta: Option<f64>,
    },
    Percentage {
        relative_delta: f64,
        threshold: f64,
    },
}

impl Display for Statistic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Statistic::Dispersion {
                z_score: Some(z),
                sigma,
                ..
            } => write!(f, "z = {z:.2} (limit {sigma})"),
            Statistic::Dispersion { z_score: None, .. } => write!(f, "zero spread"),
            Statistic::Percentage {
                relative_delta,
                threshold,
            } => write!(
                f,
                "{:+.2}% (limit {:.2}%)",
                relative_delta * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Summary of one side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub observations: usize,
    pub exit_status: i32,
    pub run_id: String,
}

impl From<&Sample> for SampleSummary {
    fn from(sample: &Sample) -> Self {
        Self {
            mean: sample.mean,
            stddev: sample.stddev,
            median: sample.median,
            min: sample.min,
            max: sample.max,
            observations: sample.times.len(),
            exit_status: sample.exit_status,
            run_id: sample.run_id.clone(),
        }
    }
}

/// Analysis of one scenario's baseline and dev samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub scenario: ScenarioId,
    pub classification: Classification,
    pub baseline: Option<SampleSummary>,
    pub dev: Option<SampleSummary>,
    /// `dev.mean - baseline.mean`, in seconds
    pub delta: Option<f64>,
    /// `delta / baseline.mean`
    pub relative_delta: Option<f64>,
    pub statistic: Option<Statistic>,
    pub missing_reason: Option<MissingReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub regression: usize,
    pub improvement: usize,
    pub no_change: usize,
    pub missing: usize,
}

impl ClassificationCounts {
    pub(crate) fn add(&mut self, classification: Classification) {
        match classification {
            Classification::Regression => self.regression += 1,
            Classification::Improvement => self.improvement += 1,
            Classification::NoChange => self.no_change += 1,
            Classification::Missing => self.missing += 1,
        }
    }
}

/// The outcome of comparing the dev branch against the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub generated_at: DateTime<Utc>,
    pub baseline_branch: String,
    pub dev_branch: String,
    /// Description of the classification policy that was applied
    pub policy: String,
    /// Whether missing scenarios fail the run
    pub missing_fails: bool,
    pub passed: bool,
    pub counts: ClassificationCounts,
    /// Scenarios that caused the verdict to fail, in catalog order
    pub failing_scenarios: Vec<ScenarioId>,
    /// One comparison per scenario, in catalog order
    pub comparisons: Vec<Comparison>,
}
