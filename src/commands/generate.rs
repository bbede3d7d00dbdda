use std::time::Instant;

use anyhow::Result;
use tracing::info;

use crate::cli::GenerateArgs;
use crate::commands::harness::default_dataset_path;
use crate::source::generate_dataset;
use crate::util::ensure_directory;

pub fn run(args: GenerateArgs) -> Result<()> {
    let started = Instant::now();
    let dataset_path = args
        .dataset_path
        .clone()
        .unwrap_or_else(|| default_dataset_path(&args.cache_root));

    if let Some(parent) = dataset_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    info!(
        path = %dataset_path.display(),
        rows = args.rows,
        dimensions = args.dimensions,
        "generating synthetic dataset"
    );
    let rows = generate_dataset(&dataset_path, args.rows, args.dimensions)?;
    info!(
        path = %dataset_path.display(),
        rows,
        elapsed_s = started.elapsed().as_secs(),
        "dataset generated"
    );

    Ok(())
}
