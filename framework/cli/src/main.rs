mod calculate;
mod cli;
mod measure;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Command, PerfGateCli};

fn main() -> ExitCode {
    env_logger::init();

    let cli = PerfGateCli::parse();
    let code = match cli.command {
        Command::Measure(args) => measure::run(args),
        Command::Calculate(args) => calculate::run(args),
    };

    ExitCode::from(code)
}
