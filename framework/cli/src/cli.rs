use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use perf_gate_calculator::policy::{
    ClassificationPolicy, DispersionThreshold, PercentageThreshold, DEFAULT_DECISIVE_RELATIVE_DELTA,
    DEFAULT_MIN_RELATIVE_DELTA, DEFAULT_PERCENTAGE_THRESHOLD, DEFAULT_SIGMA,
};
use perf_gate_runner::prelude::{DEFAULT_BACKGROUND_LOAD_THRESHOLD, DEFAULT_SCENARIO_TIMEOUT};
use perf_gate_sample_model::parse_branch_label;

#[derive(Parser)]
#[command(about, long_about = None)]
pub struct PerfGateCli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Measure every scenario in the catalog and write a result store for the branch
    Measure(MeasureArgs),
    /// Compare the baseline and dev result stores and exit non-zero if dev regressed
    Calculate(CalculateArgs),
}

#[derive(Args, Debug)]
pub struct MeasureArgs {
    /// Label of the branch being measured, for example `baseline` or `dev`.
    ///
    /// The result store is written to `<results>/<branch>.jsonl`.
    #[clap(long, value_parser = parse_branch_label)]
    pub branch: String,

    /// Directory containing one subdirectory per project, each with a `scenarios.toml`
    #[clap(long)]
    pub projects: PathBuf,

    /// Directory to write the result store to
    #[clap(long, default_value = "results")]
    pub results: PathBuf,

    /// The number of seconds a single scenario may take, including warmup runs, before it is
    /// failed and the run moves on to the next scenario
    #[clap(long, default_value_t = DEFAULT_SCENARIO_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Warn when global CPU usage is above this percentage before a scenario is measured
    #[clap(long, default_value_t = DEFAULT_BACKGROUND_LOAD_THRESHOLD)]
    pub load_threshold: f32,

    /// Do not check how busy the machine is before each scenario
    #[clap(long, default_value = "false")]
    pub no_load_check: bool,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Compare the change in means against the combined standard deviation
    Dispersion,
    /// Compare the relative change in means against a fixed threshold
    Percentage,
}

#[derive(Args, Debug)]
pub struct CalculateArgs {
    /// Directory containing the result stores written by `measure`
    #[clap(long)]
    pub results: PathBuf,

    /// Branch label of the baseline result store
    #[clap(long, default_value = "baseline", value_parser = parse_branch_label)]
    pub baseline: String,

    /// Branch label of the dev result store
    #[clap(long, default_value = "dev", value_parser = parse_branch_label)]
    pub dev: String,

    /// How to decide whether a change is significant
    #[clap(long, value_enum, default_value_t = PolicyKind::Dispersion)]
    pub policy: PolicyKind,

    /// Dispersion policy: how many combined standard deviations the means must be apart
    #[clap(long, default_value_t = DEFAULT_SIGMA, allow_negative_numbers = true)]
    pub sigma: f64,

    /// Dispersion policy: smallest relative change of the means that counts, as a fraction
    #[clap(long, default_value_t = DEFAULT_MIN_RELATIVE_DELTA, allow_negative_numbers = true)]
    pub min_relative_delta: f64,

    /// Dispersion policy: relative change that counts even when the distributions overlap
    #[clap(long, default_value_t = DEFAULT_DECISIVE_RELATIVE_DELTA, allow_negative_numbers = true)]
    pub decisive_relative_delta: f64,

    /// Dispersion policy: never classify overlapping distributions as changed
    #[clap(long, default_value = "false")]
    pub no_decisive: bool,

    /// Percentage policy: relative change of the means that counts, as a fraction
    #[clap(long, default_value_t = DEFAULT_PERCENTAGE_THRESHOLD, allow_negative_numbers = true)]
    pub threshold: f64,

    /// Do not fail when a scenario could not be compared. Missing scenarios are still reported.
    #[clap(long, default_value = "false")]
    pub allow_missing: bool,

    /// Where to write the verdict, defaults to `<results>/final_verdict.json`
    #[clap(long)]
    pub output: Option<PathBuf>,
}

impl CalculateArgs {
    pub fn build_policy(&self) -> anyhow::Result<Box<dyn ClassificationPolicy>> {
        Ok(match self.policy {
            PolicyKind::Dispersion => Box::new(DispersionThreshold::new(
                self.sigma,
                self.min_relative_delta,
                (!self.no_decisive).then_some(self.decisive_relative_delta),
            )?),
            PolicyKind::Percentage => Box::new(PercentageThreshold::new(self.threshold)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_measure() {
        let cli = PerfGateCli::try_parse_from([
            "perf-gate",
            "measure",
            "--branch",
            "dev",
            "--projects",
            "performance/projects",
            "--no-progress",
        ])
        .unwrap();

        let Command::Measure(args) = cli.command else {
            panic!("Expected measure command");
        };
        assert_eq!(args.branch, "dev");
        assert_eq!(args.projects, PathBuf::from("performance/projects"));
        assert_eq!(args.results, PathBuf::from("results"));
        assert_eq!(args.timeout, DEFAULT_SCENARIO_TIMEOUT.as_secs());
        assert!(args.no_progress);
        assert!(!args.no_load_check);
    }

    #[test]
    fn rejects_unsafe_branch_label() {
        let result = PerfGateCli::try_parse_from([
            "perf-gate",
            "measure",
            "--branch",
            "../escape",
            "--projects",
            "projects",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_calculate_defaults() {
        let cli =
            PerfGateCli::try_parse_from(["perf-gate", "calculate", "--results", "out"]).unwrap();

        let Command::Calculate(args) = cli.command else {
            panic!("Expected calculate command");
        };
        assert_eq!(args.baseline, "baseline");
        assert_eq!(args.dev, "dev");
        assert_eq!(args.policy, PolicyKind::Dispersion);
        assert!(!args.allow_missing);
        assert!(args.output.is_none());
        assert!(args
            .build_policy()
            .unwrap()
            .describe()
            .starts_with("dispersion"));
    }

    #[test]
    fn builds_percentage_policy() {
        let cli = PerfGateCli::try_parse_from([
            "perf-gate",
            "calculate",
            "--results",
            "out",
            "--policy",
            "percentage",
            "--threshold",
            "0.2",
        ])
        .unwrap();

        let Command::Calculate(args) = cli.command else {
            panic!("Expected calculate command");
        };
        assert_eq!(
            args.build_policy().unwrap().describe(),
            "percentage threshold: |relative delta| > 0.2"
        );
    }

    #[test]
    fn invalid_policy_configuration_is_an_error() {
        let cli = PerfGateCli::try_parse_from([
            "perf-gate",
            "calculate",
            "--results",
            "out",
            "--sigma",
            "-1",
        ])
        .unwrap();

        let Command::Calculate(args) = cli.command else {
            panic!("Expected calculate command");
        };
        let err = args.build_policy().err().expect("expected policy build to fail");
        assert!(format!("{err:#}").contains("sigma"), "{err:#}");
    }

    #[test]
    fn negative_threshold_reaches_policy_validation() {
        let cli = PerfGateCli::try_parse_from([
            "perf-gate",
            "calculate",
            "--results",
            "out",
            "--policy",
            "percentage",
            "--threshold",
            "-0.1",
        ])
        .unwrap();

        let Command::Calculate(args) = cli.command else {
            panic!("Expected calculate command");
        };
        assert_eq!(args.threshold, -0.1);
        assert!(args.build_policy().is_err());
    }
}
