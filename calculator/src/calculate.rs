use chrono::{DateTime, Utc};
use itertools::Itertools;
use perf_gate_sample_model::{ResultStore, Sample, ScenarioId};

use crate::model::{
    Classification, ClassificationCounts, Comparison, FinalVerdict, MissingReason, SampleSummary,
};
use crate::policy::{deltas, ClassificationPolicy};

#[derive(Debug, Clone)]
pub struct CalculateOptions {
    /// Fail the verdict when any scenario could not be compared
    pub missing_fails: bool,
}

impl Default for CalculateOptions {
    fn default() -> Self {
        Self {
            missing_fails: true,
        }
    }
}

/// Compare every scenario found in either store and aggregate the results into a verdict.
///
/// This is a pure computation. The same stores, policy, options and timestamp always produce
/// the same verdict.
pub fn calculate(
    baseline: &ResultStore,
    dev: &ResultStore,
    policy: &dyn ClassificationPolicy,
    options: &CalculateOptions,
    generated_at: DateTime<Utc>,
) -> FinalVerdict {
    let scenarios = scenario_ids(baseline)
        .chain(scenario_ids(dev))
        .sorted()
        .dedup()
        .cloned()
        .collect::<Vec<_>>();

    let comparisons = scenarios
        .iter()
        .map(|scenario| compare(scenario, baseline, dev, policy))
        .collect::<Vec<_>>();

    let mut counts = ClassificationCounts::default();
    let mut failing_scenarios = Vec::new();
    for comparison in &comparisons {
        counts.add(comparison.classification);

        let fails = match comparison.classification {
            Classification::Regression => true,
            Classification::Missing => options.missing_fails,
            Classification::Improvement | Classification::NoChange => false,
        };
        if fails {
            failing_scenarios.push(comparison.scenario.clone());
        }
    }

    let passed = failing_scenarios.is_empty();
    log::info!(
        "Compared {} scenarios: {} regressions, {} improvements, {} unchanged, {} missing. Verdict: {}",
        comparisons.len(),
        counts.regression,
        counts.improvement,
        counts.no_change,
        counts.missing,
        if passed { "pass" } else { "fail" }
    );

    FinalVerdict {
        generated_at,
        baseline_branch: baseline.branch().to_string(),
        dev_branch: dev.branch().to_string(),
        policy: policy.describe(),
        missing_fails: options.missing_fails,
        passed,
        counts,
        failing_scenarios,
        comparisons,
    }
}

fn scenario_ids(store: &ResultStore) -> impl Iterator<Item = &ScenarioId> {
    store
        .samples()
        .map(|sample| &sample.scenario)
        .chain(store.failures().map(|(scenario, _)| scenario))
}

fn compare(
    scenario: &ScenarioId,
    baseline_store: &ResultStore,
    dev_store: &ResultStore,
    policy: &dyn ClassificationPolicy,
) -> Comparison {
    let baseline = baseline_store.sample(scenario);
    let dev = dev_store.sample(scenario);

    let mut comparison = Comparison {
        scenario: scenario.clone(),
        classification: Classification::Missing,
        baseline: baseline.map(SampleSummary::from),
        dev: dev.map(SampleSummary::from),
        delta: None,
        relative_delta: None,
        statistic: None,
        missing_reason: None,
    };

    let (baseline, dev) = match (baseline, dev) {
        (Some(baseline), Some(dev)) => (baseline, dev),
        (Some(_), None) => {
            comparison.missing_reason = Some(MissingReason::OnlyInBaseline {
                dev_failure: dev_store.failure(scenario).map(str::to_string),
            });
            return log_missing(comparison);
        }
        (None, Some(_)) => {
            comparison.missing_reason = Some(MissingReason::OnlyInDev {
                baseline_failure: baseline_store.failure(scenario).map(str::to_string),
            });
            return log_missing(comparison);
        }
        (None, None) => {
            comparison.missing_reason = Some(MissingReason::NotMeasured {
                baseline_failure: baseline_store.failure(scenario).unwrap_or_default().to_string(),
                dev_failure: dev_store.failure(scenario).unwrap_or_default().to_string(),
            });
            return log_missing(comparison);
        }
    };

    if let Ok((delta, relative)) = deltas(baseline, dev) {
        comparison.delta = Some(delta);
        comparison.relative_delta = Some(relative);
    }

    if let Some(failed) = [baseline, dev].into_iter().find(|s| s.exit_status != 0) {
        comparison.missing_reason = Some(MissingReason::CommandFailed {
            branch: failed.branch.clone(),
            exit_status: failed.exit_status,
        });
        return log_missing(comparison);
    }

    if baseline.fingerprint != dev.fingerprint {
        comparison.missing_reason = Some(MissingReason::ConfigurationMismatch {
            baseline_fingerprint: baseline.fingerprint.clone(),
            dev_fingerprint: dev.fingerprint.clone(),
        });
        return log_missing(comparison);
    }

    match policy.classify(baseline, dev) {
        Ok(judgement) => {
            log_judgement(baseline, dev, judgement.classification);
            comparison.classification = judgement.classification;
            comparison.statistic = Some(judgement.statistic);
        }
        Err(ambiguity) => {
            comparison.missing_reason = Some(MissingReason::Ambiguous {
                detail: ambiguity.to_string(),
            });
            return log_missing(comparison);
        }
    }

    comparison
}

fn log_missing(comparison: Comparison) -> Comparison {
    if let Some(reason) = &comparison.missing_reason {
        log::warn!("Cannot compare {}: {}", comparison.scenario, reason);
    }
    comparison
}

fn log_judgement(baseline: &Sample, dev: &Sample, classification: Classification) {
    log::debug!(
        "{}: baseline {:.4}s ± {:.4}s, dev {:.4}s ± {:.4}s -> {}",
        baseline.scenario,
        baseline.mean,
        baseline.stddev,
        dev.mean,
        dev.stddev,
        classification
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DispersionThreshold;
    use crate::test_support::{fixed_time, sample_with, store};

    #[test]
    fn identical_stores_pass() {
        let baseline = store(
            "baseline",
            vec![
                sample_with("baseline", "a", "parse", 1.0, 0.05),
                sample_with("baseline", "b", "parse", 2.0, 0.0),
            ],
        );
        let dev = store(
            "dev",
            vec![
                sample_with("dev", "a", "parse", 1.0, 0.05),
                sample_with("dev", "b", "parse", 2.0, 0.0),
            ],
        );

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert!(verdict.passed);
        assert!(verdict.failing_scenarios.is_empty());
        assert_eq!(verdict.counts.no_change, 2);
        assert!(verdict
            .comparisons
            .iter()
            .all(|c| c.classification == Classification::NoChange && c.delta == Some(0.0)));
    }

    #[test]
    fn scenario_only_in_baseline_is_missing_and_fails() {
        let baseline = store(
            "baseline",
            vec![
                sample_with("baseline", "a", "parse", 1.0, 0.05),
                sample_with("baseline", "b", "parse", 2.0, 0.1),
            ],
        );
        let mut dev = store("dev", vec![sample_with("dev", "a", "parse", 1.0, 0.05)]);
        dev.record_failure(ScenarioId::new("b", "parse"), "timed out after 1800s");

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert!(!verdict.passed);
        assert_eq!(verdict.failing_scenarios, vec![ScenarioId::new("b", "parse")]);
        let missing = &verdict.comparisons[1];
        assert_eq!(missing.classification, Classification::Missing);
        assert_eq!(
            missing.missing_reason,
            Some(MissingReason::OnlyInBaseline {
                dev_failure: Some("timed out after 1800s".to_string())
            })
        );
        assert!(missing.baseline.is_some());
        assert!(missing.dev.is_none());
    }

    #[test]
    fn missing_can_be_allowed() {
        let baseline = store("baseline", vec![]);
        let dev = store("dev", vec![sample_with("dev", "a", "parse", 1.0, 0.05)]);

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions {
                missing_fails: false,
            },
            fixed_time(),
        );

        assert!(verdict.passed);
        assert_eq!(verdict.counts.missing, 1);
        assert_eq!(
            verdict.comparisons[0].missing_reason,
            Some(MissingReason::OnlyInDev {
                baseline_failure: None
            })
        );
    }

    #[test]
    fn scenario_failed_on_both_sides_is_reported() {
        let mut baseline = store("baseline", vec![]);
        baseline.record_failure(ScenarioId::new("a", "parse"), "exit 1");
        let mut dev = store("dev", vec![]);
        dev.record_failure(ScenarioId::new("a", "parse"), "exit 2");

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert!(!verdict.passed);
        assert_eq!(
            verdict.comparisons[0].missing_reason,
            Some(MissingReason::NotMeasured {
                baseline_failure: "exit 1".to_string(),
                dev_failure: "exit 2".to_string()
            })
        );
    }

    #[test]
    fn mismatched_configuration_is_missing() {
        let baseline = store(
            "baseline",
            vec![sample_with("baseline", "a", "parse", 1.0, 0.05)],
        );
        let mut dev_sample = sample_with("dev", "a", "parse", 1.0, 0.05);
        dev_sample.fingerprint = "different".to_string();
        let dev = store("dev", vec![dev_sample]);

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert_eq!(verdict.comparisons[0].classification, Classification::Missing);
        assert!(matches!(
            verdict.comparisons[0].missing_reason,
            Some(MissingReason::ConfigurationMismatch { .. })
        ));
    }

    #[test]
    fn failed_command_is_missing() {
        let baseline = store(
            "baseline",
            vec![sample_with("baseline", "a", "parse", 1.0, 0.05)],
        );
        let mut dev_sample = sample_with("dev", "a", "parse", 0.1, 0.01);
        dev_sample.exit_status = 2;
        let dev = store("dev", vec![dev_sample]);

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert_eq!(
            verdict.comparisons[0].missing_reason,
            Some(MissingReason::CommandFailed {
                branch: "dev".to_string(),
                exit_status: 2
            })
        );
    }

    #[test]
    fn ambiguous_statistic_is_missing_not_a_panic() {
        let baseline = store(
            "baseline",
            vec![sample_with("baseline", "a", "parse", 0.0, 0.0)],
        );
        let dev = store("dev", vec![sample_with("dev", "a", "parse", 1.0, 0.0)]);

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert_eq!(verdict.comparisons[0].classification, Classification::Missing);
        assert!(matches!(
            verdict.comparisons[0].missing_reason,
            Some(MissingReason::Ambiguous { .. })
        ));
        assert!(!verdict.passed);
    }

    #[test]
    fn comparisons_follow_catalog_order() {
        let baseline = store(
            "baseline",
            vec![
                sample_with("baseline", "b", "parse", 1.0, 0.05),
                sample_with("baseline", "a", "run", 1.0, 0.05),
            ],
        );
        let dev = store(
            "dev",
            vec![
                sample_with("dev", "a", "compile", 1.0, 0.05),
                sample_with("dev", "b", "parse", 1.0, 0.05),
                sample_with("dev", "a", "run", 1.0, 0.05),
            ],
        );

        let verdict = calculate(
            &baseline,
            &dev,
            &DispersionThreshold::default(),
            &CalculateOptions::default(),
            fixed_time(),
        );

        assert_eq!(
            verdict
                .comparisons
                .iter()
                .map(|c| c.scenario.to_string())
                .collect::<Vec<_>>(),
            vec!["a/compile", "a/run", "b/parse"]
        );
    }
}
