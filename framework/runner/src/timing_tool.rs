use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::catalog::Scenario;
use crate::collector::CollectionCause;
use crate::process_group::ProcessGroupGuard;

/// Environment variable to override the path to the `hyperfine` binary used to time scenarios.
pub const PERF_GATE_HYPERFINE_PATH_ENV: &str = "PERF_GATE_HYPERFINE_PATH";

/// Lines of the tool's stderr kept when it fails
const STDERR_TAIL_LINES: usize = 20;

/// Get the path to the `hyperfine` binary.
///
/// If the [`PERF_GATE_HYPERFINE_PATH_ENV`] environment variable is set, its value is used as the
/// path. Otherwise `hyperfine` is looked up on the user's `PATH`.
pub fn hyperfine_path() -> anyhow::Result<PathBuf> {
    resolve_hyperfine_path(env::var(PERF_GATE_HYPERFINE_PATH_ENV).ok().as_deref())
}

fn resolve_hyperfine_path(configured: Option<&str>) -> anyhow::Result<PathBuf> {
    match configured {
        Some("") => {
            bail!("'{PERF_GATE_HYPERFINE_PATH_ENV}' set to empty string");
        }
        Some("hyperfine") | None => {
            log::debug!("'{PERF_GATE_HYPERFINE_PATH_ENV}' is not a path so looking in user's 'PATH'");
            which::which("hyperfine").with_context(|| {
                format!(
                    "hyperfine not found in PATH. Please install it or set '{PERF_GATE_HYPERFINE_PATH_ENV}' to the correct path."
                )
            })
        }
        Some(path) => {
            let hyperfine_path = PathBuf::from(path);
            if !hyperfine_path.exists() {
                bail!(
                    "Path to hyperfine overridden with '{PERF_GATE_HYPERFINE_PATH_ENV}={path}' but that path doesn't exist",
                    path = hyperfine_path.display()
                );
            }
            Ok(hyperfine_path)
        }
    }
}

#[derive(Debug, Deserialize)]
struct HyperfineExport {
    results: Vec<HyperfineResult>,
}

/// The parts of a hyperfine result entry that are used to build a sample
#[derive(Debug, Deserialize)]
pub(crate) struct HyperfineResult {
    #[serde(default)]
    pub times: Vec<f64>,
    /// `null` entries are runs terminated by a signal
    #[serde(default)]
    pub exit_codes: Vec<Option<i32>>,
}

impl HyperfineResult {
    /// The first failing exit status of the measured command, or zero if every run succeeded.
    ///
    /// A run killed by a signal has no exit code and is reported as `-1`.
    pub fn exit_status(&self) -> i32 {
        self.exit_codes
            .iter()
            .map(|code| code.unwrap_or(-1))
            .find(|code| *code != 0)
            .unwrap_or(0)
    }
}

/// Invokes `hyperfine` to time a single scenario.
#[derive(Debug, Clone)]
pub struct Hyperfine {
    path: PathBuf,
}

impl Hyperfine {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn command(&self, scenario: &Scenario, export_path: &Path) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.path);
        command
            .arg("--runs")
            .arg(scenario.runs.to_string())
            .arg("--warmup")
            .arg(scenario.warmup.to_string())
            .arg("--style")
            .arg("none")
            .arg("--command-name")
            .arg(&scenario.id.label)
            .arg("--export-json")
            .arg(export_path)
            .arg(scenario.render_command())
            .current_dir(&scenario.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so the measured command can be killed along with hyperfine
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Time the scenario, reading the result back from the JSON export.
    pub(crate) async fn measure(
        &self,
        scenario: &Scenario,
        export_path: &Path,
    ) -> Result<HyperfineResult, CollectionCause> {
        log::debug!(
            "Running {} for {}: {}",
            self.path.display(),
            scenario.id,
            scenario.render_command()
        );

        let child = self
            .command(scenario, export_path)
            .spawn()
            .map_err(CollectionCause::Spawn)?;
        let group = ProcessGroupGuard::new(child.id());
        let output = child
            .wait_with_output()
            .await
            .map_err(CollectionCause::Io)?;
        group.disarm();

        if !output.status.success() {
            return Err(CollectionCause::ToolFailed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let raw = tokio::fs::read(export_path)
            .await
            .map_err(CollectionCause::Io)?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(CollectionCause::NoResults);
        }

        let export: HyperfineExport =
            serde_json::from_slice(&raw).map_err(CollectionCause::MalformedOutput)?;
        let result = export
            .results
            .into_iter()
            .next()
            .ok_or(CollectionCause::NoResults)?;
        if result.times.is_empty() {
            return Err(CollectionCause::NoResults);
        }

        Ok(result)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
