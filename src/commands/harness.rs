use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cli::HarnessArgs;
use crate::config::{ConfigOverrides, HarnessConfig};
use crate::model::Scenario;
use crate::retry::CancellationToken;
use crate::scenarios::{define_scenarios, validate_catalog};
use crate::service::sqlite::SqliteIndexService;
use crate::util::ensure_directory;

pub fn default_dataset_path(cache_root: &Path) -> PathBuf {
    cache_root.join("dataset.sqlite")
}

pub fn resolve_config(args: &HarnessArgs, overrides: &ConfigOverrides) -> Result<HarnessConfig> {
    let config = HarnessConfig::load(args.config.as_deref(), overrides)?;
    info!(
        index_prefix = %config.index_prefix,
        vector_dimensions = config.vector_dimensions,
        batch_size = config.batch_size,
        stats_max_attempts = config.stats_max_attempts,
        deadline_secs = ?config.deadline_secs,
        "resolved harness config"
    );
    Ok(config)
}

pub fn load_catalog() -> Result<Vec<Scenario>> {
    let scenarios = define_scenarios()?;
    validate_catalog(&scenarios)?;
    Ok(scenarios)
}

pub fn open_service(args: &HarnessArgs, config: &HarnessConfig) -> Result<SqliteIndexService> {
    let db_path = args.service_db_path();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    info!(path = %db_path.display(), "opening index service");
    SqliteIndexService::open(
        &db_path,
        config.service_settle_window(),
        config.operation_timeout(),
    )
}

pub fn cancellation_token(config: &HarnessConfig) -> CancellationToken {
    match config.deadline_secs {
        Some(secs) => {
            info!(deadline_secs = secs, "run deadline armed");
            CancellationToken::with_deadline(Duration::from_secs(secs))
        }
        None => CancellationToken::new(),
    }
}
