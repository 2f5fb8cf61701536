mod comparison_table;

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tabled::settings::Style;
use tabled::Table;

use crate::model::FinalVerdict;
use crate::report::comparison_table::ComparisonRow;

/// Default file name of the verdict artifact inside the results directory
pub const VERDICT_FILE_NAME: &str = "final_verdict.json";

/// Process exit code of the `calculate` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictExitCode {
    Pass,
    /// At least one scenario regressed, or was missing when missing scenarios fail the run
    Fail,
    /// The calculation could not run, for example because a result store was missing
    CouldNotRun,
}

impl VerdictExitCode {
    pub fn for_verdict(verdict: &FinalVerdict) -> Self {
        if verdict.passed {
            VerdictExitCode::Pass
        } else {
            VerdictExitCode::Fail
        }
    }

    pub fn code(self) -> u8 {
        match self {
            VerdictExitCode::Pass => 0,
            VerdictExitCode::Fail => 1,
            VerdictExitCode::CouldNotRun => 2,
        }
    }
}

/// Write the verdict artifact as pretty printed JSON, replacing any previous artifact.
pub fn write_verdict(verdict: &FinalVerdict, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut file = std::io::BufWriter::new(
        std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut file, verdict).context("Failed to serialize verdict")?;
    file.write_all(b"\n")?;
    file.flush()?;

    Ok(())
}

/// Load a verdict artifact written by [write_verdict]
pub fn load_verdict(path: &Path) -> anyhow::Result<FinalVerdict> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader).context("Failed to load verdict")
}

/// Human readable table of the comparisons
pub fn render_table(verdict: &FinalVerdict) -> String {
    let rows = verdict
        .comparisons
        .iter()
        .map(ComparisonRow::from)
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

/// Write the artifact, print the comparison table and decide the exit code.
pub fn report(verdict: &FinalVerdict, path: &Path) -> anyhow::Result<VerdictExitCode> {
    write_verdict(verdict, path)?;
    log::info!("Wrote verdict to {}", path.display());

    println!(
        "\nComparison of `{}` against `{}`",
        verdict.dev_branch, verdict.baseline_branch
    );
    println!("{}", render_table(verdict));

    if verdict.passed {
        println!("PASS: no regressions detected");
    } else {
        println!(
            "FAIL: {} scenario(s) failed the gate: {}",
            verdict.failing_scenarios.len(),
            verdict
                .failing_scenarios
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(VerdictExitCode::for_verdict(verdict))
}
