mod cli;
mod commands;
mod comparison;
mod config;
mod ingestion;
mod model;
mod retry;
mod scenarios;
mod schema;
mod semantic;
mod service;
mod source;
mod statistics;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scenarios(args) => commands::scenarios::run(args),
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Report(args) => commands::report::run(args),
        Commands::Quality(args) => commands::quality::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
