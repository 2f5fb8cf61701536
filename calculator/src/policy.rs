//! Policies that decide whether the difference between two samples is significant.
//!
//! Every policy must be deterministic, and must never classify a faster dev sample as a
//! [Classification::Regression].

use crate::model::{Classification, Statistic};
use perf_gate_sample_model::Sample;

/// Slack for comparing relative deltas against thresholds, so that `1.5 * mean` is treated as a
/// 50% change despite rounding.
const RELATIVE_EPSILON: f64 = 1e-9;

pub const DEFAULT_SIGMA: f64 = 2.0;
pub const DEFAULT_MIN_RELATIVE_DELTA: f64 = 0.05;
pub const DEFAULT_DECISIVE_RELATIVE_DELTA: f64 = 0.5;
pub const DEFAULT_PERCENTAGE_THRESHOLD: f64 = 0.10;

/// The statistic for a pair of samples could not be computed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationAmbiguity {
    #[error("baseline mean {0} is not positive, relative change is undefined")]
    NonPositiveBaseline(f64),
    #[error("{0} is not a finite number")]
    NonFinite(&'static str),
    #[error("{0} sample has no observations")]
    NoObservations(&'static str),
}

/// A classification and the statistic that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub classification: Classification,
    pub statistic: Statistic,
}

/// Decides how a dev sample compares to its baseline.
pub trait ClassificationPolicy {
    /// Human readable description, including the configured thresholds
    fn describe(&self) -> String;

    fn classify(
        &self,
        baseline: &Sample,
        dev: &Sample,
    ) -> Result<Judgement, ClassificationAmbiguity>;
}

/// Absolute and relative change of the dev mean over the baseline mean
pub(crate) fn deltas(baseline: &Sample, dev: &Sample) -> Result<(f64, f64), ClassificationAmbiguity> {
    if baseline.times.is_empty() {
        return Err(ClassificationAmbiguity::NoObservations("baseline"));
    }
    if dev.times.is_empty() {
        return Err(ClassificationAmbiguity::NoObservations("dev"));
    }
    if !baseline.mean.is_finite() {
        return Err(ClassificationAmbiguity::NonFinite("baseline mean"));
    }
    if !dev.mean.is_finite() {
        return Err(ClassificationAmbiguity::NonFinite("dev mean"));
    }
    if baseline.mean <= 0.0 {
        return Err(ClassificationAmbiguity::NonPositiveBaseline(baseline.mean));
    }

    let delta = dev.mean - baseline.mean;
    let relative = delta / baseline.mean;
    if !relative.is_finite() {
        return Err(ClassificationAmbiguity::NonFinite("relative delta"));
    }

    Ok((delta, relative))
}

/// Direction of a relative change that has already been judged significant
fn by_direction(relative: f64, threshold: f64) -> Classification {
    if relative > threshold + RELATIVE_EPSILON {
        Classification::Regression
    } else if relative < -threshold - RELATIVE_EPSILON {
        Classification::Improvement
    } else {
        Classification::NoChange
    }
}

/// Flags a change when the means are further apart than `sigma` combined standard deviations
/// and the relative change exceeds `min_relative_delta`.
///
/// The combined standard deviation is `sqrt(baseline.stddev² + dev.stddev²)`. When both samples
/// have zero spread any non-zero delta is beyond noise and only the relative threshold applies.
///
/// A relative change of at least `decisive_relative_delta` is classified by its direction even
/// when the distributions overlap, noise that large hides real changes.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionThreshold {
    sigma: f64,
    min_relative_delta: f64,
    decisive_relative_delta: Option<f64>,
}

impl Default for DispersionThreshold {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            min_relative_delta: DEFAULT_MIN_RELATIVE_DELTA,
            decisive_relative_delta: Some(DEFAULT_DECISIVE_RELATIVE_DELTA),
        }
    }
}

impl DispersionThreshold {
    pub fn new(
        sigma: f64,
        min_relative_delta: f64,
        decisive_relative_delta: Option<f64>,
    ) -> anyhow::Result<Self> {
        ensure_non_negative("sigma", sigma)?;
        ensure_non_negative("min relative delta", min_relative_delta)?;
        if let Some(decisive) = decisive_relative_delta {
            ensure_non_negative("decisive relative delta", decisive)?;
            if decisive < min_relative_delta {
                anyhow::bail!(
                    "Decisive relative delta {decisive} must not be below the min relative delta {min_relative_delta}"
                );
            }
        }

        Ok(Self {
            sigma,
            min_relative_delta,
            decisive_relative_delta,
        })
    }
}

impl ClassificationPolicy for DispersionThreshold {
    fn describe(&self) -> String {
        let mut description = format!(
            "dispersion threshold: |delta| > {} combined stddev and |relative delta| > {}",
            self.sigma, self.min_relative_delta
        );
        if let Some(decisive) = self.decisive_relative_delta {
            description.push_str(&format!(", or |relative delta| >= {decisive}"));
        }
        description
    }

    fn classify(
        &self,
        baseline: &Sample,
        dev: &Sample,
    ) -> Result<Judgement, ClassificationAmbiguity> {
        let (delta, relative) = deltas(baseline, dev)?;

        let combined_stddev = (baseline.stddev.powi(2) + dev.stddev.powi(2)).sqrt();
        if !combined_stddev.is_finite() {
            return Err(ClassificationAmbiguity::NonFinite("combined stddev"));
        }

        let z_score = (combined_stddev > 0.0).then(|| delta / combined_stddev);
        let beyond_noise = match z_score {
            Some(z) => z.abs() > self.sigma,
            None => delta != 0.0,
        };

        let decisive = self
            .decisive_relative_delta
            .map(|decisive| by_direction(relative, decisive - 2.0 * RELATIVE_EPSILON))
            .filter(|c| *c != Classification::NoChange);

        let classification = match decisive {
            Some(classification) => classification,
            None if beyond_noise => by_direction(relative, self.min_relative_delta),
            None => Classification::NoChange,
        };

        Ok(Judgement {
            classification,
            statistic: Statistic::Dispersion {
                z_score,
                combined_stddev,
                sigma: self.sigma,
                min_relative_delta: self.min_relative_delta,
                decisive_relative_delta: self.decisive_relative_delta,
            },
        })
    }
}

/// Flags a change when the relative change of the means exceeds a fixed fraction, ignoring
/// the spread of the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentageThreshold {
    threshold: f64,
}

impl Default for PercentageThreshold {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PERCENTAGE_THRESHOLD,
        }
    }
}

impl PercentageThreshold {
    pub fn new(threshold: f64) -> anyhow::Result<Self> {
        ensure_non_negative("threshold", threshold)?;
        Ok(Self { threshold })
    }
}

impl ClassificationPolicy for PercentageThreshold {
    fn describe(&self) -> String {
        format!(
            "percentage threshold: |relative delta| > {}",
            self.threshold
        )
    }

    fn classify(
        &self,
        baseline: &Sample,
        dev: &Sample,
    ) -> Result<Judgement, ClassificationAmbiguity> {
        let (_, relative) = deltas(baseline, dev)?;

        Ok(Judgement {
            classification: by_direction(relative, self.threshold),
            statistic: Statistic::Percentage {
                relative_delta: relative,
                threshold: self.threshold,
            },
        })
    }
}

fn ensure_non_negative(name: &str, value: f64) -> anyhow::Result<()> {
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("The {name} must be a finite, non-negative number, got {value}");
    }
    Ok(())
}
