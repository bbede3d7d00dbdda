use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ReportArgs;
use crate::commands::harness;
use crate::comparison::{compare, render_table};
use crate::model::{ComparisonRow, Scenario, ScenarioStatistics, UnavailableStatistics};
use crate::retry::ThreadSleeper;
use crate::statistics::StatisticsCollector;
use crate::util::{now_utc_string, write_json_stdout, write_stdout};

#[derive(Debug, Clone, Serialize)]
struct ReportOutput {
    generated_at: String,
    index_prefix: String,
    statistics: Vec<ScenarioStatistics>,
    unavailable_statistics: Vec<UnavailableStatistics>,
    comparison: Vec<ComparisonRow>,
}

/// Statistics and comparison for indexes left behind by an earlier run.
pub fn run(args: ReportArgs) -> Result<()> {
    let mut overrides = args.harness.overrides();
    overrides.stats_max_attempts = args.stats_max_attempts;
    let config = harness::resolve_config(&args.harness, &overrides)?;
    let scenarios = harness::load_catalog()?;

    let service = harness::open_service(&args.harness, &config)?;
    let cancel = harness::cancellation_token(&config);
    let collector =
        StatisticsCollector::new(&service, &ThreadSleeper, &cancel, config.statistics_policy());

    let targets = scenarios.iter().collect::<Vec<&Scenario>>();
    let collected = collector.collect_scenarios(&config.index_prefix, &targets);
    let comparison = compare(&collected.available);

    info!(
        available = collected.available.len(),
        unavailable = collected.unavailable.len(),
        rows = comparison.len(),
        "report ready"
    );

    if args.json {
        return write_json_stdout(&ReportOutput {
            generated_at: now_utc_string(),
            index_prefix: config.index_prefix,
            statistics: collected.available,
            unavailable_statistics: collected.unavailable,
            comparison,
        });
    }

    if comparison.is_empty() {
        warn!("no comparison rows to report");
        return Ok(());
    }
    write_stdout(&render_table(&comparison))
}
