use chrono::{TimeZone, Utc};
use perf_gate_calculator::model::Classification;
use perf_gate_calculator::policy::DispersionThreshold;
use perf_gate_calculator::{
    calculate, load_result_stores, load_verdict, report, CalculateOptions, VerdictExitCode,
    VERDICT_FILE_NAME,
};
use perf_gate_sample_model::{MeasurementConfig, ResultStore, Sample, ScenarioId};
use std::path::Path;

fn sample(branch: &str, project: &str, mean: f64, stddev: f64) -> Sample {
    let scenario = ScenarioId::new(project, "parse");
    let config = MeasurementConfig {
        command: "dbt parse --no-version-check".to_string(),
        runs: 3,
        warmup: 1,
    };

    Sample {
        branch: branch.to_string(),
        fingerprint: config.fingerprint(&scenario),
        scenario,
        run_id: format!("{branch}-run"),
        measured_at: 1_700_000_000,
        command: config.command,
        runs: config.runs,
        warmup: config.warmup,
        times: vec![mean - stddev, mean, mean + stddev],
        mean,
        stddev,
        median: mean,
        min: mean - stddev,
        max: mean + stddev,
        exit_status: 0,
    }
}

fn write_store(dir: &Path, branch: &str, samples: Vec<Sample>) -> ResultStore {
    let mut store = ResultStore::new(branch);
    for sample in samples {
        store.insert_sample(sample).unwrap();
    }
    store.write_to_dir(dir).unwrap();
    store
}

/// Load the stores from disk, as a separate `calculate` process would, and report the verdict.
fn run_calculate(results: &Path, output: &Path) -> VerdictExitCode {
    let (baseline, dev) = load_result_stores(results, "baseline", "dev").unwrap();
    let verdict = calculate(
        &baseline,
        &dev,
        &DispersionThreshold::default(),
        &CalculateOptions::default(),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    );
    report(&verdict, output).unwrap()
}

#[test]
fn noise_passes_and_slowdown_fails() {
    env_logger::try_init().ok();

    let results = tempfile::tempdir().unwrap();
    let written_baseline = write_store(
        results.path(),
        "baseline",
        vec![sample("baseline", "A", 1.0, 0.05), sample("baseline", "B", 2.0, 0.1)],
    );
    let written_dev = write_store(
        results.path(),
        "dev",
        vec![sample("dev", "A", 1.02, 0.05), sample("dev", "B", 3.0, 0.1)],
    );

    let (baseline, dev) = load_result_stores(results.path(), "baseline", "dev").unwrap();
    pretty_assertions::assert_eq!(written_baseline, baseline);
    pretty_assertions::assert_eq!(written_dev, dev);

    let output = results.path().join(VERDICT_FILE_NAME);
    let exit_code = run_calculate(results.path(), &output);

    assert_eq!(exit_code, VerdictExitCode::Fail);
    assert_ne!(exit_code.code(), 0);

    let verdict = load_verdict(&output).unwrap();
    assert!(!verdict.passed);
    assert_eq!(
        verdict
            .comparisons
            .iter()
            .map(|c| (c.scenario.project.as_str(), c.classification))
            .collect::<Vec<_>>(),
        vec![
            ("A", Classification::NoChange),
            ("B", Classification::Regression)
        ]
    );
    assert_eq!(verdict.failing_scenarios, vec![ScenarioId::new("B", "parse")]);

    let b = &verdict.comparisons[1];
    assert_eq!(b.delta, Some(1.0));
    assert_eq!(b.relative_delta, Some(0.5));
}

#[test]
fn calculate_is_idempotent() {
    let results = tempfile::tempdir().unwrap();
    write_store(
        results.path(),
        "baseline",
        vec![sample("baseline", "A", 1.0, 0.05), sample("baseline", "B", 2.0, 0.1)],
    );
    write_store(
        results.path(),
        "dev",
        vec![sample("dev", "A", 0.4, 0.02), sample("dev", "C", 3.0, 0.1)],
    );

    let out = tempfile::tempdir().unwrap();
    let first = out.path().join("first.json");
    let second = out.path().join("second.json");

    let first_code = run_calculate(results.path(), &first);
    let second_code = run_calculate(results.path(), &second);

    assert_eq!(first_code, second_code);
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

#[test]
fn identical_stores_pass() {
    let results = tempfile::tempdir().unwrap();
    let samples = |branch: &str| {
        vec![
            sample(branch, "A", 1.0, 0.05),
            sample(branch, "B", 2.0, 0.1),
            sample(branch, "C", 0.25, 0.0),
        ]
    };
    write_store(results.path(), "baseline", samples("baseline"));
    write_store(results.path(), "dev", samples("dev"));

    let output = results.path().join(VERDICT_FILE_NAME);
    let exit_code = run_calculate(results.path(), &output);

    assert_eq!(exit_code, VerdictExitCode::Pass);
    assert_eq!(exit_code.code(), 0);
    let verdict = load_verdict(&output).unwrap();
    assert!(verdict
        .comparisons
        .iter()
        .all(|c| c.classification == Classification::NoChange));
}
