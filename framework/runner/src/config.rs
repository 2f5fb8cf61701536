use std::path::PathBuf;
use std::time::Duration;

/// Default upper bound for timing one scenario, including warmup runs
pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default global CPU usage, in percent, above which a busy machine is reported
pub const DEFAULT_BACKGROUND_LOAD_THRESHOLD: f32 = 25.0;

/// Configuration for a [crate::collector::SampleCollector]
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Path to the `hyperfine` binary
    pub timing_tool: PathBuf,
    /// Directory the result store is written to
    pub results_dir: PathBuf,
    /// A scenario whose measurement takes longer than this is failed and the run moves on
    pub scenario_timeout: Duration,
    pub show_progress: bool,
    /// Warn when the machine is busier than this before a scenario. `None` disables the check.
    pub background_load_threshold: Option<f32>,
}

impl CollectorConfig {
    pub fn new(timing_tool: PathBuf, results_dir: PathBuf) -> Self {
        Self {
            timing_tool,
            results_dir,
            scenario_timeout: DEFAULT_SCENARIO_TIMEOUT,
            show_progress: true,
            background_load_threshold: Some(DEFAULT_BACKGROUND_LOAD_THRESHOLD),
        }
    }

    /// Set `scenario_timeout` option
    pub fn scenario_timeout(mut self, timeout: Duration) -> Self {
        self.scenario_timeout = timeout;
        self
    }

    /// Set `show_progress` option
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Set `background_load_threshold` option
    pub fn background_load_threshold(mut self, threshold: Option<f32>) -> Self {
        self.background_load_threshold = threshold;
        self
    }
}
