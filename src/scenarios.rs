use std::collections::HashSet;

use anyhow::{Result, bail};
use tracing::warn;

use crate::model::{CompressionType, Scenario};

pub const BASELINE_SCENARIO: &str = "baseline";
pub const DEFAULT_TRUNCATE_DIMS: usize = 1024;

/// The fixed benchmark matrix, in processing order.
pub fn define_scenarios() -> Result<Vec<Scenario>> {
    use CompressionType::{Binary, Scalar};

    let truncated = Some(DEFAULT_TRUNCATE_DIMS);

    Ok(vec![
        Scenario::new(
            BASELINE_SCENARIO,
            CompressionType::None,
            None,
            false,
            true,
            "Baseline configuration without compression",
        )?,
        Scenario::new(
            "baseline-no-store",
            CompressionType::None,
            None,
            false,
            false,
            "Baseline configuration without compression, embedding not retrievable",
        )?,
        Scenario::new(
            "scalar-full",
            Scalar,
            None,
            false,
            false,
            "Scalar quantization (int8) with full dimensions, preserved originals",
        )?,
        Scenario::new(
            "scalar-truncated",
            Scalar,
            truncated,
            false,
            false,
            "Scalar quantization (int8) with 1024 dimensions, preserved originals",
        )?,
        Scenario::new(
            "scalar-truncated-discard",
            Scalar,
            truncated,
            true,
            false,
            "Scalar quantization (int8) with 1024 dimensions, discarded originals",
        )?,
        Scenario::new(
            "binary-full",
            Binary,
            None,
            false,
            false,
            "Binary quantization with full dimensions, preserved originals",
        )?,
        Scenario::new(
            "binary-truncated",
            Binary,
            truncated,
            false,
            false,
            "Binary quantization with 1024 dimensions, preserved originals",
        )?,
        Scenario::new(
            "binary-truncated-discard",
            Binary,
            truncated,
            true,
            false,
            "Binary quantization with 1024 dimensions, discarded originals",
        )?,
    ])
}

/// Rejects catalogs the harness cannot run. A missing baseline is only
/// reported here; the comparison step handles it.
pub fn validate_catalog(scenarios: &[Scenario]) -> Result<()> {
    if scenarios.is_empty() {
        bail!("scenario catalog is empty");
    }

    let mut seen = HashSet::<&str>::with_capacity(scenarios.len());
    for scenario in scenarios {
        if !seen.insert(scenario.name()) {
            bail!("duplicate scenario name in catalog: {}", scenario.name());
        }
    }

    if !seen.contains(BASELINE_SCENARIO) {
        warn!(
            baseline = BASELINE_SCENARIO,
            "catalog has no baseline scenario; reductions will not be computed"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_scenarios_returns_fixed_unique_catalog() {
        let scenarios = define_scenarios().expect("catalog should build");
        assert_eq!(scenarios.len(), 8);

        let names = scenarios.iter().map(Scenario::name).collect::<HashSet<&str>>();
        assert_eq!(names.len(), scenarios.len());
        assert_eq!(
            scenarios
                .iter()
                .filter(|scenario| scenario.name() == BASELINE_SCENARIO)
                .count(),
            1
        );
        assert_eq!(scenarios[0].name(), BASELINE_SCENARIO);
    }

    #[test]
    fn define_scenarios_is_deterministic() {
        let first = define_scenarios().expect("catalog should build");
        let second = define_scenarios().expect("catalog should build");
        assert_eq!(first, second);
    }

    #[test]
    fn define_scenarios_only_truncates_compressed_scenarios() {
        for scenario in define_scenarios().expect("catalog should build") {
            if scenario.truncate_dims().is_some() || scenario.discard_originals() {
                assert!(scenario.compression_type().is_compressed());
            }
        }
    }

    #[test]
    fn validate_catalog_rejects_empty_and_duplicate_catalogs() {
        assert!(validate_catalog(&[]).is_err());

        let scenario = Scenario::new("baseline", CompressionType::None, None, false, true, "")
            .expect("valid scenario");
        let err = validate_catalog(&[scenario.clone(), scenario])
            .expect_err("duplicates should be rejected");
        assert!(err.to_string().contains("duplicate scenario name"));
    }

    #[test]
    fn validate_catalog_accepts_catalog_without_baseline() {
        let scenario = Scenario::new("binary-full", CompressionType::Binary, None, false, false, "")
            .expect("valid scenario");
        assert!(validate_catalog(&[scenario]).is_ok());
    }
}
