use perf_gate_sample_model::{MeasurementConfig, ScenarioId};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the file that marks a directory as a benchmark project
pub const SCENARIO_FILE_NAME: &str = "scenarios.toml";

const DEFAULT_RUNS: u32 = 10;
const DEFAULT_WARMUP: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Projects path does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Projects path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to list projects")]
    Walk(#[from] walkdir::Error),
    #[error("Malformed scenario file {}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid scenario in {}: {reason}", path.display())]
    InvalidScenario { path: PathBuf, reason: String },
    #[error("Project directory name is not valid UTF-8: {}", .0.display())]
    NonUtf8Project(PathBuf),
    #[error("No scenarios found under {}", .0.display())]
    NoScenarios(PathBuf),
}

/// A benchmark command to run against one project
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: ScenarioId,
    /// Shell command, which may contain `{project}` and `{project_dir}` placeholders
    pub command: String,
    /// Absolute path of the project directory
    pub project_dir: PathBuf,
    /// Directory the command is run from
    pub working_dir: PathBuf,
    pub runs: u32,
    pub warmup: u32,
}

impl Scenario {
    /// The command with its placeholders filled in
    pub fn render_command(&self) -> String {
        self.command
            .replace("{project_dir}", &self.project_dir.to_string_lossy())
            .replace("{project}", &self.id.project)
    }

    pub fn measurement_config(&self) -> MeasurementConfig {
        MeasurementConfig {
            command: self.render_command(),
            runs: self.runs,
            warmup: self.warmup,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default, rename = "scenario")]
    scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Defaults {
    #[serde(default = "default_runs")]
    runs: u32,
    #[serde(default = "default_warmup")]
    warmup: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            warmup: DEFAULT_WARMUP,
        }
    }
}

fn default_runs() -> u32 {
    DEFAULT_RUNS
}

fn default_warmup() -> u32 {
    DEFAULT_WARMUP
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    label: String,
    command: String,
    runs: Option<u32>,
    warmup: Option<u32>,
    working_dir: Option<PathBuf>,
}

/// Load every scenario defined under `projects_path`.
///
/// Each immediate subdirectory that contains a [SCENARIO_FILE_NAME] is a project, named after
/// the directory. The scenarios are returned sorted by project name and then command label.
pub fn load(projects_path: &Path) -> Result<Vec<Scenario>, CatalogError> {
    if !projects_path.exists() {
        return Err(CatalogError::NotFound(projects_path.to_path_buf()));
    }
    if !projects_path.is_dir() {
        return Err(CatalogError::NotADirectory(projects_path.to_path_buf()));
    }

    let mut scenarios = Vec::new();
    for entry in WalkDir::new(projects_path)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let scenario_file = entry.path().join(SCENARIO_FILE_NAME);
        if !scenario_file.is_file() {
            log::debug!(
                "Skipping {} which has no {SCENARIO_FILE_NAME}",
                entry.path().display()
            );
            continue;
        }

        let project = entry
            .file_name()
            .to_str()
            .ok_or_else(|| CatalogError::NonUtf8Project(entry.path().to_path_buf()))?;

        scenarios.extend(load_project(project, entry.path(), &scenario_file)?);
    }

    if scenarios.is_empty() {
        return Err(CatalogError::NoScenarios(projects_path.to_path_buf()));
    }

    scenarios.sort_by(|a, b| a.id.cmp(&b.id));
    log::info!(
        "Loaded {} scenarios from {}",
        scenarios.len(),
        projects_path.display()
    );

    Ok(scenarios)
}

fn load_project(
    project: &str,
    project_dir: &Path,
    scenario_file: &Path,
) -> Result<Vec<Scenario>, CatalogError> {
    let content = std::fs::read_to_string(scenario_file).map_err(|source| CatalogError::Io {
        path: scenario_file.to_path_buf(),
        source,
    })?;
    let file: ScenarioFile = toml::from_str(&content).map_err(|source| CatalogError::Malformed {
        path: scenario_file.to_path_buf(),
        source,
    })?;

    let project_dir = project_dir
        .canonicalize()
        .map_err(|source| CatalogError::Io {
            path: project_dir.to_path_buf(),
            source,
        })?;

    let invalid = |reason: String| CatalogError::InvalidScenario {
        path: scenario_file.to_path_buf(),
        reason,
    };

    let mut scenarios: Vec<Scenario> = Vec::with_capacity(file.scenarios.len());
    for entry in file.scenarios {
        if entry.label.trim().is_empty() {
            return Err(invalid("scenario label must not be empty".to_string()));
        }
        if entry.command.trim().is_empty() {
            return Err(invalid(format!("scenario `{}` has no command", entry.label)));
        }
        if scenarios.iter().any(|s| s.id.label == entry.label) {
            return Err(invalid(format!("duplicate scenario label `{}`", entry.label)));
        }

        let runs = entry.runs.unwrap_or(file.defaults.runs);
        if runs == 0 {
            return Err(invalid(format!(
                "scenario `{}` must be run at least once",
                entry.label
            )));
        }

        let working_dir = match entry.working_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => project_dir.join(dir),
            None => project_dir.clone(),
        };

        scenarios.push(Scenario {
            id: ScenarioId::new(project, entry.label),
            command: entry.command,
            project_dir: project_dir.clone(),
            working_dir,
            runs,
            warmup: entry.warmup.unwrap_or(file.defaults.warmup),
        });
    }

    if scenarios.is_empty() {
        log::warn!("{} defines no scenarios", scenario_file.display());
    }

    Ok(scenarios)
}
