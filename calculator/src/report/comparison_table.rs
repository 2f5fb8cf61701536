use tabled::Tabled;

use crate::model::Comparison;

#[derive(Tabled)]
pub(crate) struct ComparisonRow {
    pub scenario: String,
    pub classification: String,
    #[tabled(display = "seconds")]
    pub baseline_mean_s: Option<f64>,
    #[tabled(display = "seconds")]
    pub dev_mean_s: Option<f64>,
    #[tabled(display = "percent")]
    pub change: Option<f64>,
    pub detail: String,
}

impl From<&Comparison> for ComparisonRow {
    fn from(comparison: &Comparison) -> Self {
        let detail = match (&comparison.missing_reason, &comparison.statistic) {
            (Some(reason), _) => reason.to_string(),
            (None, Some(statistic)) => statistic.to_string(),
            (None, None) => String::new(),
        };

        Self {
            scenario: comparison.scenario.to_string(),
            classification: comparison.classification.to_string(),
            baseline_mean_s: comparison.baseline.as_ref().map(|s| s.mean),
            dev_mean_s: comparison.dev.as_ref().map(|s| s.mean),
            change: comparison.relative_delta,
            detail,
        }
    }
}

fn seconds(n: &Option<f64>) -> String {
    n.map(|n| format!("{:.4}", n)).unwrap_or_else(|| "-".to_string())
}

fn percent(n: &Option<f64>) -> String {
    n.map(|n| format!("{:+.2}%", n * 100.0))
        .unwrap_or_else(|| "-".to_string())
}
