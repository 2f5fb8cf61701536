use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use perf_gate_sample_model::{ResultStore, Sample, SampleError, ScenarioId};

use crate::catalog::Scenario;
use crate::config::CollectorConfig;
use crate::executor::{Executor, Interruption};
use crate::monitor::LoadMonitor;
use crate::progress::scenario_progress;
use crate::shutdown::ShutdownHandle;
use crate::timing_tool::Hyperfine;

/// Why a single scenario could not be measured
#[derive(Debug, thiserror::Error)]
pub enum CollectionCause {
    #[error("failed to start the timing tool: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("timing tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },
    #[error("timing tool produced no results")]
    NoResults,
    #[error("could not parse timing tool output: {0}")]
    MalformedOutput(#[source] serde_json::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled before the measurement completed")]
    Cancelled,
    #[error("{0}")]
    InvalidSample(#[source] SampleError),
    #[error("i/o error while measuring: {0}")]
    Io(#[source] std::io::Error),
}

/// A scenario that failed to measure. Recorded, never fatal to the rest of the run.
#[derive(Debug, thiserror::Error)]
#[error("Failed to measure {scenario}: {cause}")]
pub struct CollectionError {
    pub scenario: ScenarioId,
    pub cause: CollectionCause,
}

/// Outcome of collecting samples for one branch
#[derive(Debug)]
pub struct CollectionReport {
    pub store: ResultStore,
    /// Where the store was written
    pub store_path: PathBuf,
    /// Every scenario that could not be measured, in catalog order
    pub errors: Vec<CollectionError>,
}

impl CollectionReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e.cause, CollectionCause::Cancelled))
    }
}

/// Measures scenarios one at a time with the configured timing tool.
///
/// Scenarios are never measured concurrently, contention between them would make the timings
/// incomparable.
pub struct SampleCollector {
    config: CollectorConfig,
    executor: Executor,
    tool: Hyperfine,
    run_id: String,
}

impl SampleCollector {
    pub fn new(config: CollectorConfig) -> anyhow::Result<Self> {
        let executor = Executor::new(ShutdownHandle::new())?;
        let tool = Hyperfine::new(config.timing_tool.clone());

        Ok(Self {
            config,
            executor,
            tool,
            run_id: nanoid::nanoid!(),
        })
    }

    /// The id shared by every sample this collector produces
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Raising this handle cancels the measurement in progress and all remaining scenarios.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.executor.shutdown_handle().clone()
    }

    /// Measure every scenario for `branch` and write the result store to the results directory.
    ///
    /// Failures of individual scenarios are recorded in the store and the report, collection
    /// carries on with the next scenario. Only failing to write the store is an error.
    pub fn collect(
        &self,
        branch: &str,
        scenarios: &[Scenario],
    ) -> anyhow::Result<CollectionReport> {
        log::info!(
            "Measuring {} scenarios for branch `{}` (run {})",
            scenarios.len(),
            branch,
            self.run_id
        );

        let mut store = ResultStore::new(branch);
        let mut errors = Vec::new();
        let mut monitor = self.config.background_load_threshold.map(LoadMonitor::new);
        let progress = scenario_progress(scenarios.len(), branch, self.config.show_progress);

        for scenario in scenarios {
            progress.set_message(scenario.id.to_string());

            if let Some(monitor) = monitor.as_mut() {
                if !self.executor.shutdown_handle().is_shutdown() {
                    monitor.warn_if_busy(&scenario.id);
                }
            }

            match self.measure(branch, scenario) {
                Ok(sample) => {
                    log::info!(
                        "{}: mean {:.4}s, stddev {:.4}s over {} runs",
                        scenario.id,
                        sample.mean,
                        sample.stddev,
                        sample.times.len()
                    );
                    store
                        .insert_sample(sample)
                        .with_context(|| format!("Failed to store sample for {}", scenario.id))?;
                }
                Err(e) => {
                    log::warn!("{e}");
                    store.record_failure(e.scenario.clone(), e.cause.to_string());
                    errors.push(e);
                }
            }

            progress.inc(1);
        }
        progress.finish_and_clear();

        let store_path = store
            .write_to_dir(&self.config.results_dir)
            .with_context(|| {
                format!(
                    "Failed to write result store for `{branch}` to {}",
                    self.config.results_dir.display()
                )
            })?;
        log::info!("Wrote result store to {}", store_path.display());

        if !errors.is_empty() {
            log::warn!(
                "{} out of {} scenarios failed to measure for `{}`",
                errors.len(),
                scenarios.len(),
                branch
            );
        }

        Ok(CollectionReport {
            store,
            store_path,
            errors,
        })
    }

    fn measure(&self, branch: &str, scenario: &Scenario) -> Result<Sample, CollectionError> {
        let fail = |cause| CollectionError {
            scenario: scenario.id.clone(),
            cause,
        };

        let export = tempfile::Builder::new()
            .prefix("perf-gate-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| fail(CollectionCause::Io(e)))?;

        let result = self
            .executor
            .execute_in_place(
                self.config.scenario_timeout,
                self.tool.measure(scenario, export.path()),
            )
            .map_err(|interruption| match interruption {
                Interruption::TimedOut { after } => fail(CollectionCause::TimedOut(after)),
                Interruption::Shutdown => fail(CollectionCause::Cancelled),
            })?
            .map_err(fail)?;

        let exit_status = result.exit_status();
        Sample::new(
            branch.to_string(),
            scenario.id.clone(),
            self.run_id.clone(),
            chrono::Utc::now().timestamp(),
            scenario.measurement_config(),
            result.times,
            exit_status,
        )
        .map_err(|e| fail(CollectionCause::InvalidSample(e)))
    }
}
