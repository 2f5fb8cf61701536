use std::time::Duration;

use anyhow::Context;
use perf_gate_runner::prelude::{hyperfine_path, load_catalog, CollectorConfig, SampleCollector};

use crate::cli::MeasureArgs;

/// Every scenario was measured
pub(crate) const MEASURE_COMPLETE: u8 = 0;
/// The store was written but some scenarios failed to measure or the run was cancelled
pub(crate) const MEASURE_INCOMPLETE: u8 = 1;
/// Nothing was measured, the catalog or the timing tool is unusable
pub(crate) const MEASURE_COULD_NOT_RUN: u8 = 2;

pub(crate) fn run(args: MeasureArgs) -> u8 {
    match measure(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:?}");
            MEASURE_COULD_NOT_RUN
        }
    }
}

fn measure(args: MeasureArgs) -> anyhow::Result<u8> {
    let scenarios = load_catalog(&args.projects)
        .with_context(|| format!("Invalid scenario catalog at {}", args.projects.display()))?;
    let timing_tool = hyperfine_path()?;
    log::info!("Using timing tool at {}", timing_tool.display());

    let config = CollectorConfig::new(timing_tool, args.results)
        .scenario_timeout(Duration::from_secs(args.timeout))
        .show_progress(!args.no_progress)
        .background_load_threshold((!args.no_load_check).then_some(args.load_threshold));
    let collector = SampleCollector::new(config)?;

    let report = collector.collect(&args.branch, &scenarios)?;
    if report.was_cancelled() {
        log::warn!(
            "Measurement of `{}` was cancelled, the result store at {} is incomplete",
            args.branch,
            report.store_path.display()
        );
        return Ok(MEASURE_INCOMPLETE);
    }

    if !report.is_complete() {
        for error in &report.errors {
            log::error!("{error}");
        }
        return Ok(MEASURE_INCOMPLETE);
    }

    println!(
        "Measured {} scenarios for `{}`, results written to {}",
        scenarios.len(),
        args.branch,
        report.store_path.display()
    );
    Ok(MEASURE_COMPLETE)
}
