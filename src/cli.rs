use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "icbench",
    version,
    about = "Vector index compression benchmarking harness"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Scenarios(ScenariosArgs),
    Generate(GenerateArgs),
    Run(RunArgs),
    Report(ReportArgs),
    Quality(QualityArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HarnessArgs {
    #[arg(long, default_value = ".cache/icbench")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub service_db_path: Option<PathBuf>,

    #[arg(long)]
    pub index_prefix: Option<String>,

    #[arg(long)]
    pub vector_dimensions: Option<usize>,

    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

impl HarnessArgs {
    pub fn service_db_path(&self) -> PathBuf {
        self.service_db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("index_service.sqlite"))
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            index_prefix: self.index_prefix.clone(),
            vector_dimensions: self.vector_dimensions,
            deadline_secs: self.deadline_secs,
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScenariosArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long, default_value = ".cache/icbench")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub dataset_path: Option<PathBuf>,

    #[arg(long, default_value_t = 10_000)]
    pub rows: usize,

    #[arg(long, default_value_t = 3072)]
    pub dimensions: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub harness: HarnessArgs,

    #[arg(long)]
    pub dataset_path: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub stats_max_attempts: Option<u32>,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub inject_document_failure_pct: u8,

    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub inject_batch_failure_pct: u8,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub harness: HarnessArgs,

    #[arg(long)]
    pub stats_max_attempts: Option<u32>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct QualityArgs {
    #[command(flatten)]
    pub harness: HarnessArgs,

    #[arg(long, default_value = "first avian dinosaur in the fossil record")]
    pub query: String,

    #[arg(long, default_value_t = 5)]
    pub top: usize,

    #[arg(long, default_value_t = 50)]
    pub k_nearest: usize,
}
