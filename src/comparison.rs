use std::fmt::Write as _;

use tracing::warn;

use crate::model::{ComparisonRow, ScenarioStatistics};
use crate::scenarios::BASELINE_SCENARIO;

/// Baseline-relative reductions, largest index first. Returns no rows when
/// the baseline has no statistics entry.
pub fn compare(entries: &[ScenarioStatistics]) -> Vec<ComparisonRow> {
    let Some(baseline) = entries
        .iter()
        .find(|entry| entry.scenario == BASELINE_SCENARIO)
    else {
        warn!(
            baseline = BASELINE_SCENARIO,
            "baseline scenario not found; comparison skipped"
        );
        return Vec::new();
    };

    let baseline_storage = baseline.statistics.storage_mb();
    let baseline_vector = baseline.statistics.vector_mb();

    let mut rows = entries
        .iter()
        .map(|entry| {
            let storage_mb = entry.statistics.storage_mb();
            let vector_mb = entry.statistics.vector_mb();
            ComparisonRow {
                scenario: entry.scenario.clone(),
                index_name: entry.index_name.clone(),
                storage_mb,
                storage_reduction_pct: reduction_pct(baseline_storage, storage_mb),
                vector_mb,
                vector_reduction_pct: reduction_pct(baseline_vector, vector_mb),
                rescoring_enabled: entry.rescoring_enabled,
            }
        })
        .collect::<Vec<ComparisonRow>>();

    rows.sort_by(|left, right| right.total_mb().total_cmp(&left.total_mb()));
    rows
}

/// A zero baseline yields 0% rather than a non-finite value.
pub fn reduction_pct(baseline: f64, value: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (baseline - value) / baseline * 100.0
}

pub fn render_table(rows: &[ComparisonRow]) -> String {
    let mut out = String::new();
    let header = format!(
        "| {:<45} | {:<28} | {:>18} | {:>21} | {:>18} | {:>21} |",
        "Index Name",
        "Scenario",
        "Storage Size (MB)",
        "Storage Reduction (%)",
        "Vector Size (MB)",
        "Vector Reduction (%)"
    );
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{}", "-".repeat(header.len()));

    for row in rows {
        let _ = writeln!(
            out,
            "| {:<45} | {:<28} | {:>18.4} | {:>21.2} | {:>18.4} | {:>21.2} |",
            row.index_name,
            row.scenario,
            row.storage_mb,
            row.storage_reduction_pct,
            row.vector_mb,
            row.vector_reduction_pct
        );
    }

    out
}
