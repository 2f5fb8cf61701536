use perf_gate_sample_model::{load_result_store, LoadError, ResultStore, STORE_FILE_EXTENSION};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Load the baseline and dev result stores from a results directory.
///
/// The directory must contain exactly one store for each of the two labels and no other
/// stores. Any other files, such as a previous verdict, are ignored.
pub fn load_result_stores(
    dir: &Path,
    baseline_label: &str,
    dev_label: &str,
) -> Result<(ResultStore, ResultStore), LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::ResultsDirNotFound(dir.to_path_buf()));
    }

    let mut found = BTreeMap::<String, PathBuf>::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(STORE_FILE_EXTENSION)
        {
            continue;
        }

        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|label| *label == baseline_label || *label == dev_label)
            .ok_or_else(|| LoadError::UnexpectedStore(path.to_path_buf()))?;
        log::debug!("Found result store for `{label}`: {}", path.display());
        found.insert(label.to_string(), path.to_path_buf());
    }

    let mut load = |label: &str| -> Result<ResultStore, LoadError> {
        let path = found.remove(label).ok_or_else(|| LoadError::MissingStore {
            label: label.to_string(),
            dir: dir.to_path_buf(),
        })?;
        load_result_store(&path)
    };

    let baseline = load(baseline_label)?;
    let dev = load(dev_label)?;

    log::info!(
        "Loaded {} baseline and {} dev samples from {}",
        baseline.samples().count(),
        dev.samples().count(),
        dir.display()
    );

    Ok((baseline, dev))
}
