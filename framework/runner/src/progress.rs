use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar showing how many scenarios have been measured for the branch.
///
/// Hidden when progress output is disabled, which is recommended for CI where nobody is watching
/// and the bar only adds noise to the logs.
pub(crate) fn scenario_progress(total: usize, branch: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::with_template(
        "{spinner:.green} {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} [{elapsed_precise}] {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => log::warn!("Invalid progress template, using the default style: {e}"),
    }
    pb.set_prefix(branch.to_string());
    pb
}
