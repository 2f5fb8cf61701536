use anyhow::Context;
use perf_gate_calculator::{
    calculate, load_result_stores, report, CalculateOptions, VerdictExitCode, VERDICT_FILE_NAME,
};

use crate::cli::CalculateArgs;

pub(crate) fn run(args: CalculateArgs) -> u8 {
    match calculate_verdict(args) {
        Ok(code) => code.code(),
        Err(e) => {
            log::error!("{e:?}");
            VerdictExitCode::CouldNotRun.code()
        }
    }
}

fn calculate_verdict(args: CalculateArgs) -> anyhow::Result<VerdictExitCode> {
    if args.baseline == args.dev {
        anyhow::bail!(
            "Baseline and dev must be different branches, both are `{}`",
            args.baseline
        );
    }

    let policy = args.build_policy().context("Invalid policy configuration")?;
    let (baseline, dev) = load_result_stores(&args.results, &args.baseline, &args.dev)
        .context("Failed to load result stores")?;

    let options = CalculateOptions {
        missing_fails: !args.allow_missing,
    };
    let verdict = calculate(&baseline, &dev, policy.as_ref(), &options, chrono::Utc::now());

    let output = args
        .output
        .unwrap_or_else(|| args.results.join(VERDICT_FILE_NAME));
    report(&verdict, &output)
}
