use anyhow::Result;
use tracing::info;

use crate::cli::ScenariosArgs;
use crate::commands::harness;
use crate::util::write_json_stdout;

pub fn run(args: ScenariosArgs) -> Result<()> {
    let scenarios = harness::load_catalog()?;

    if args.json {
        return write_json_stdout(&scenarios);
    }

    for scenario in &scenarios {
        info!(
            scenario = scenario.name(),
            compression = scenario.compression_type().as_str(),
            truncate_dims = ?scenario.truncate_dims(),
            discard_originals = scenario.discard_originals(),
            stored_embedding = scenario.stored_embedding(),
            rescoring_enabled = scenario.rescoring_enabled(),
            description = scenario.description(),
            "scenario"
        );
    }
    info!(scenario_count = scenarios.len(), "scenario catalog");

    Ok(())
}
