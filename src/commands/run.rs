use std::path::Path;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::commands::harness;
use crate::comparison::{compare, render_table};
use crate::config::HarnessConfig;
use crate::ingestion::BatchIngestionEngine;
use crate::model::{
    ComparisonRow, Document, IngestionSummary, Scenario, ScenarioStatistics,
    UnavailableStatistics,
};
use crate::retry::{CancellationToken, Sleeper, ThreadSleeper};
use crate::schema::{IndexCreationReport, IndexDescriptor, build_descriptor, create_indexes};
use crate::service::IndexService;
use crate::service::faults::FaultInjectingService;
use crate::source::load_documents;
use crate::statistics::{CollectedStatistics, StatisticsCollector};
use crate::util::{
    ensure_directory, now_utc_string, sha256_hex, utc_compact_string, write_json_pretty,
    write_stdout,
};

#[derive(Debug, Clone, Serialize)]
struct BenchRunManifest {
    manifest_version: u32,
    run_id: String,
    status: String,
    started_at: String,
    updated_at: String,
    command: String,
    config: HarnessConfig,
    config_sha256: String,
    scenarios: Vec<Scenario>,
    paths: BenchRunPaths,
    fault_injection: FaultInjection,
    index_creation: IndexCreationReport,
    ingestion: Vec<IngestionSummary>,
    statistics: Vec<ScenarioStatistics>,
    unavailable_statistics: Vec<UnavailableStatistics>,
    comparison: Vec<ComparisonRow>,
    warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct BenchRunPaths {
    cache_root: String,
    dataset_path: String,
    service_db_path: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct FaultInjection {
    document_failure_pct: u8,
    batch_failure_pct: u8,
}

/// Everything one pass over the catalog produced.
#[derive(Debug, Clone)]
pub struct BenchRunOutcome {
    pub index_creation: IndexCreationReport,
    pub ingestion: Vec<IngestionSummary>,
    pub statistics: CollectedStatistics,
    pub comparison: Vec<ComparisonRow>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("bench-{}", utc_compact_string(started_ts));

    let mut overrides = args.harness.overrides();
    overrides.batch_size = args.batch_size;
    overrides.stats_max_attempts = args.stats_max_attempts;
    let config = harness::resolve_config(&args.harness, &overrides)?;
    let scenarios = harness::load_catalog()?;

    let cache_root = args.harness.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("bench_run_{}.json", utc_compact_string(started_ts)))
    });
    let dataset_path = args
        .dataset_path
        .clone()
        .unwrap_or_else(|| harness::default_dataset_path(&cache_root));

    info!(cache_root = %cache_root.display(), run_id = %run_id, "starting benchmark run");

    let documents = load_dataset(&dataset_path, config.vector_dimensions)?;
    let service = FaultInjectingService::new(
        harness::open_service(&args.harness, &config)?,
        args.inject_document_failure_pct,
        args.inject_batch_failure_pct,
    );
    let cancel = harness::cancellation_token(&config);

    let outcome = run_pipeline(
        &service,
        &ThreadSleeper,
        &cancel,
        &config,
        &scenarios,
        &documents,
    )?;

    if !outcome.comparison.is_empty() {
        write_stdout(&render_table(&outcome.comparison))?;
    }

    let warnings = collect_warnings(&outcome, &cancel);
    let status = if cancel.is_cancelled() {
        "cancelled"
    } else {
        "completed"
    };

    let config_json = serde_json::to_string(&config)?;
    let manifest = BenchRunManifest {
        manifest_version: 1,
        run_id,
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_run_command(&args),
        config_sha256: sha256_hex(&config_json),
        config,
        scenarios,
        paths: BenchRunPaths {
            cache_root: cache_root.display().to_string(),
            dataset_path: dataset_path.display().to_string(),
            service_db_path: args.harness.service_db_path().display().to_string(),
        },
        fault_injection: FaultInjection {
            document_failure_pct: args.inject_document_failure_pct,
            batch_failure_pct: args.inject_batch_failure_pct,
        },
        index_creation: outcome.index_creation,
        ingestion: outcome.ingestion,
        statistics: outcome.statistics.available,
        unavailable_statistics: outcome.statistics.unavailable,
        comparison: outcome.comparison,
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote benchmark run manifest");
    info!(status, "benchmark run finished");

    Ok(())
}

/// Creates every index, ingests into each created one in catalog order,
/// then collects statistics once all ingestion is done.
pub fn run_pipeline(
    service: &dyn IndexService,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    config: &HarnessConfig,
    scenarios: &[Scenario],
    documents: &[Document],
) -> Result<BenchRunOutcome> {
    let descriptors = scenarios
        .iter()
        .map(|scenario| build_descriptor(&config.index_prefix, scenario, config.vector_dimensions))
        .collect::<Result<Vec<IndexDescriptor>>>()?;

    let index_creation = create_indexes(service, scenarios, &descriptors);
    let created = scenarios
        .iter()
        .filter(|scenario| index_creation.is_created(scenario.name()))
        .collect::<Vec<&Scenario>>();

    let engine = BatchIngestionEngine::new(service, sleeper, cancel, config.ingestion_settings());
    let mut ingestion = Vec::<IngestionSummary>::with_capacity(created.len());
    for scenario in &created {
        let index_name = scenario.index_name(&config.index_prefix);
        info!(
            scenario = scenario.name(),
            index = %index_name,
            description = scenario.description(),
            "ingesting scenario"
        );
        ingestion.push(engine.ingest(documents, &index_name));
    }

    let collector =
        StatisticsCollector::new(service, sleeper, cancel, config.statistics_policy());
    let statistics = collector.collect_scenarios(&config.index_prefix, &created);
    let comparison = compare(&statistics.available);

    Ok(BenchRunOutcome {
        index_creation,
        ingestion,
        statistics,
        comparison,
    })
}

fn load_dataset(path: &Path, vector_dimensions: usize) -> Result<Vec<Document>> {
    if !path.exists() {
        bail!(
            "dataset not found: {} (run `icbench generate` first)",
            path.display()
        );
    }

    let documents = load_documents(path, vector_dimensions)?;
    if documents.is_empty() {
        warn!(path = %path.display(), "dataset has no documents");
    }
    Ok(documents)
}

fn collect_warnings(outcome: &BenchRunOutcome, cancel: &CancellationToken) -> Vec<String> {
    let mut warnings = Vec::<String>::new();

    for failure in &outcome.index_creation.failed {
        warnings.push(format!(
            "index creation failed for {}: {}",
            failure.scenario, failure.reason
        ));
    }
    for summary in &outcome.ingestion {
        if summary.failed > 0 {
            warnings.push(format!(
                "{}: {} of {} documents failed",
                summary.index_name, summary.failed, summary.total_documents
            ));
        }
    }
    for entry in &outcome.statistics.unavailable {
        warnings.push(format!(
            "statistics unavailable for {}: {}",
            entry.scenario, entry.reason
        ));
    }
    if outcome.comparison.is_empty() {
        warnings.push("baseline statistics unavailable; comparison skipped".to_string());
    }
    if cancel.is_cancelled() {
        warnings.push("run cancelled before completion".to_string());
    }

    warnings
}

fn render_run_command(args: &RunArgs) -> String {
    let mut command = format!(
        "icbench run --cache-root {}",
        args.harness.cache_root.display()
    );

    if let Some(path) = &args.harness.config {
        command.push_str(&format!(" --config {}", path.display()));
    }
    if let Some(path) = &args.dataset_path {
        command.push_str(&format!(" --dataset-path {}", path.display()));
    }
    if let Some(prefix) = &args.harness.index_prefix {
        command.push_str(&format!(" --index-prefix {prefix}"));
    }
    if let Some(dimensions) = args.harness.vector_dimensions {
        command.push_str(&format!(" --vector-dimensions {dimensions}"));
    }
    if let Some(batch_size) = args.batch_size {
        command.push_str(&format!(" --batch-size {batch_size}"));
    }
    if let Some(attempts) = args.stats_max_attempts {
        command.push_str(&format!(" --stats-max-attempts {attempts}"));
    }
    if let Some(secs) = args.harness.deadline_secs {
        command.push_str(&format!(" --deadline-secs {secs}"));
    }
    if args.inject_document_failure_pct > 0 {
        command.push_str(&format!(
            " --inject-document-failure-pct {}",
            args.inject_document_failure_pct
        ));
    }
    if args.inject_batch_failure_pct > 0 {
        command.push_str(&format!(
            " --inject-batch-failure-pct {}",
            args.inject_batch_failure_pct
        ));
    }

    command
}
