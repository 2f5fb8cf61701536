use crate::{Sample, ScenarioId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// File extension used for result stores. Each store is a JSON Lines file.
pub const STORE_FILE_EXTENSION: &str = "jsonl";

/// A scenario that could not be measured
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub branch: String,
    pub scenario: ScenarioId,
    /// Human readable description of why the measurement failed
    pub cause: String,
}

/// One line of a result store file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum StoreRecord {
    Sample(Sample),
    Failure(FailureRecord),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StoreError {
    #[error("Record for branch `{found}` cannot be added to the store for branch `{expected}`")]
    BranchMismatch { expected: String, found: String },
    #[error("Scenario {0} already has a sample in this store")]
    DuplicateScenario(ScenarioId),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Results directory not found: {}", .0.display())]
    ResultsDirNotFound(PathBuf),
    #[error("No result store for branch `{label}` in {}", dir.display())]
    MissingStore { label: String, dir: PathBuf },
    #[error("Unexpected result store {}, only the baseline and dev stores are allowed", .0.display())]
    UnexpectedStore(PathBuf),
    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed record on line {line} of {}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid record on line {line} of {}", path.display())]
    Invalid {
        path: PathBuf,
        line: usize,
        #[source]
        source: StoreError,
    },
}

/// All samples collected for one branch label
///
/// Each scenario has at most one sample. Scenarios that could not be measured are kept as
/// failures so that they can be reported rather than silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultStore {
    branch: String,
    samples: BTreeMap<ScenarioId, Sample>,
    failures: BTreeMap<ScenarioId, String>,
}

impl ResultStore {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            samples: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Add a sample to the store
    ///
    /// Fails if the sample belongs to a different branch or the scenario already has a sample.
    /// A successful sample replaces any failure previously recorded for the same scenario.
    pub fn insert_sample(&mut self, sample: Sample) -> Result<(), StoreError> {
        if sample.branch != self.branch {
            return Err(StoreError::BranchMismatch {
                expected: self.branch.clone(),
                found: sample.branch,
            });
        }
        if self.samples.contains_key(&sample.scenario) {
            return Err(StoreError::DuplicateScenario(sample.scenario));
        }

        self.failures.remove(&sample.scenario);
        self.samples.insert(sample.scenario.clone(), sample);
        Ok(())
    }

    /// Record that a scenario could not be measured
    ///
    /// Ignored if the scenario already has a sample.
    pub fn record_failure(&mut self, scenario: ScenarioId, cause: impl Into<String>) {
        if self.samples.contains_key(&scenario) {
            log::warn!("Ignoring failure for {scenario} which already has a sample");
            return;
        }
        self.failures.insert(scenario, cause.into());
    }

    pub fn sample(&self, scenario: &ScenarioId) -> Option<&Sample> {
        self.samples.get(scenario)
    }

    /// Samples in scenario order
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    /// The recorded failure cause for a scenario, if it failed to measure
    pub fn failure(&self, scenario: &ScenarioId) -> Option<&str> {
        self.failures.get(scenario).map(String::as_str)
    }

    /// Failures in scenario order
    pub fn failures(&self) -> impl Iterator<Item = (&ScenarioId, &str)> {
        self.failures.iter().map(|(id, cause)| (id, cause.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.failures.is_empty()
    }

    /// Add a record read back from a store file
    pub fn insert_record(&mut self, record: StoreRecord) -> Result<(), StoreError> {
        match record {
            StoreRecord::Sample(sample) => self.insert_sample(sample),
            StoreRecord::Failure(failure) => {
                if failure.branch != self.branch {
                    return Err(StoreError::BranchMismatch {
                        expected: self.branch.clone(),
                        found: failure.branch,
                    });
                }
                self.record_failure(failure.scenario, failure.cause);
                Ok(())
            }
        }
    }

    /// Serialize the store as JSON Lines, samples first and then failures, each in scenario
    /// order.
    pub fn write_records<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        for sample in self.samples.values() {
            serde_json::to_writer(&mut *writer, &StoreRecord::Sample(sample.clone()))?;
            writer.write_all(b"\n")?;
        }
        for (scenario, cause) in &self.failures {
            let record = StoreRecord::Failure(FailureRecord {
                branch: self.branch.clone(),
                scenario: scenario.clone(),
                cause: cause.clone(),
            });
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Write the store to `<dir>/<branch>.jsonl`, replacing any previous store for the branch.
    pub fn write_to_dir(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = store_path(dir, &self.branch);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        self.write_records(&mut file)?;
        file.flush()?;
        Ok(path)
    }
}

/// The path of the result store for a branch inside a results directory
pub fn store_path(dir: &Path, branch: &str) -> PathBuf {
    dir.join(format!("{branch}.{STORE_FILE_EXTENSION}"))
}

/// Load a result store file
///
/// The branch label is taken from the file name and every record in the file must belong to
/// that branch.
pub fn load_result_store(path: &Path) -> Result<ResultStore, LoadError> {
    let branch = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LoadError::UnexpectedStore(path.to_path_buf()))?;

    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = std::io::BufReader::new(file);

    let mut store = ResultStore::new(branch);
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: StoreRecord =
            serde_json::from_str(&line).map_err(|source| LoadError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
        store
            .insert_record(record)
            .map_err(|source| LoadError::Invalid {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
    }

    if store.is_empty() {
        log::warn!("Result store {} has no records", path.display());
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = ResultStore::new("baseline");
        store
            .insert_sample(sample(
                "baseline",
                "01_simple",
                "parse",
                vec![0.1, 1.0 / 3.0, 0.7, 2.0f64.sqrt()],
            ))
            .unwrap();
        store
            .insert_sample(sample("baseline", "02_large", "parse", vec![12.5, 12.75]))
            .unwrap();
        store.record_failure(ScenarioId::new("03_broken", "parse"), "exited with 1");

        let path = store.write_to_dir(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("baseline.jsonl"));

        let loaded = load_result_store(&path).unwrap();
        pretty_assertions::assert_eq!(store, loaded);

        let reloaded = loaded
            .sample(&ScenarioId::new("01_simple", "parse"))
            .unwrap();
        assert_eq!(reloaded.times[1].to_bits(), (1.0f64 / 3.0).to_bits());
        assert_eq!(
            loaded.failure(&ScenarioId::new("03_broken", "parse")),
            Some("exited with 1")
        );
    }

    #[test]
    fn one_record_per_line() {
        let mut store = ResultStore::new("dev");
        store
            .insert_sample(sample("dev", "b", "parse", vec![1.0]))
            .unwrap();
        store
            .insert_sample(sample("dev", "a", "parse", vec![1.0]))
            .unwrap();
        store.record_failure(ScenarioId::new("c", "parse"), "timed out");

        let mut out = Vec::new();
        store.write_records(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(r#""record":"sample""#));
        assert!(lines[0].contains(r#""project":"a""#));
        assert!(lines[1].contains(r#""project":"b""#));
        assert!(lines[2].contains(r#""record":"failure""#));
    }

    #[test]
    fn rejects_samples_from_other_branch_and_duplicates() {
        let mut store = ResultStore::new("dev");
        let err = store
            .insert_sample(sample("baseline", "a", "parse", vec![1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::BranchMismatch {
                expected: "dev".to_string(),
                found: "baseline".to_string()
            }
        );

        store
            .insert_sample(sample("dev", "a", "parse", vec![1.0]))
            .unwrap();
        let err = store
            .insert_sample(sample("dev", "a", "parse", vec![2.0]))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateScenario(ScenarioId::new("a", "parse")));
    }

    #[test]
    fn failure_does_not_shadow_sample() {
        let mut store = ResultStore::new("dev");
        let id = ScenarioId::new("a", "parse");
        store.record_failure(id.clone(), "timed out");
        store
            .insert_sample(sample("dev", "a", "parse", vec![1.0]))
            .unwrap();
        store.record_failure(id.clone(), "late failure");

        assert!(store.sample(&id).is_some());
        assert_eq!(store.failure(&id), None);
    }

    #[test]
    fn load_rejects_records_for_another_branch() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::new("baseline");
        store
            .insert_sample(sample("baseline", "a", "parse", vec![1.0]))
            .unwrap();
        let written = store.write_to_dir(dir.path()).unwrap();
        let renamed = dir.path().join("dev.jsonl");
        std::fs::rename(written, &renamed).unwrap();

        let err = load_result_store(&renamed).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                line: 1,
                source: StoreError::BranchMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn load_reports_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.jsonl");
        std::fs::write(&path, "\n{\"record\":\"sample\"}\n").unwrap();

        let err = load_result_store(&path).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 2, .. }));
    }
}
