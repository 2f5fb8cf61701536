use perf_gate_sample_model::ScenarioId;
use sysinfo::System;

/// Checks how busy the machine is before each measurement.
///
/// Timings are only comparable when the machine is otherwise idle. This won't stop the run, it
/// logs a warning so that the user knows the sample for that scenario might be noisy.
///
/// The global CPU usage is sampled over [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] while no
/// measurement is running.
pub(crate) struct LoadMonitor {
    sys: System,
    threshold_pct: f32,
}

impl LoadMonitor {
    pub(crate) fn new(threshold_pct: f32) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self { sys, threshold_pct }
    }

    pub(crate) fn warn_if_busy(&mut self, scenario: &ScenarioId) {
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_cpu_usage();

        let usage = self.sys.global_cpu_usage();
        if usage > self.threshold_pct {
            log::warn!(
                "High background CPU usage detected before measuring {}. {:.2}% of {} cores in use, timings may be noisy",
                scenario,
                usage,
                self.sys.cpus().len()
            );
        }
    }
}
