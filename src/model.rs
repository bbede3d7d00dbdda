use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::util::bytes_to_mb;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Scalar,
    Binary,
}

impl CompressionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Scalar => "scalar",
            Self::Binary => "binary",
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One point in the benchmark matrix. Only constructible through
/// [`Scenario::new`], which rejects inconsistent combinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    name: String,
    compression_type: CompressionType,
    truncate_dims: Option<usize>,
    discard_originals: bool,
    stored_embedding: bool,
    description: String,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        compression_type: CompressionType,
        truncate_dims: Option<usize>,
        discard_originals: bool,
        stored_embedding: bool,
        description: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            bail!("scenario name must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!("scenario name must be lowercase alphanumeric with dashes: {name}");
        }
        if truncate_dims == Some(0) {
            bail!("scenario {name}: truncate_dims must be positive");
        }
        if truncate_dims.is_some() && !compression_type.is_compressed() {
            bail!("scenario {name}: truncate_dims requires a compression type");
        }
        if discard_originals && !compression_type.is_compressed() {
            bail!("scenario {name}: discard_originals requires a compression type");
        }

        Ok(Self {
            name,
            compression_type,
            truncate_dims,
            discard_originals,
            stored_embedding,
            description: description.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    pub fn truncate_dims(&self) -> Option<usize> {
        self.truncate_dims
    }

    pub fn discard_originals(&self) -> bool {
        self.discard_originals
    }

    pub fn stored_embedding(&self) -> bool {
        self.stored_embedding
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Rescoring against full-precision vectors is only possible when the
    /// index compresses and keeps the originals.
    pub fn rescoring_enabled(&self) -> bool {
        self.compression_type.is_compressed() && !self.discard_originals
    }

    pub fn index_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingResult {
    pub key: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub storage_bytes: u64,
    pub vector_index_bytes: u64,
}

impl IndexStatistics {
    pub fn storage_mb(&self) -> f64 {
        bytes_to_mb(self.storage_bytes)
    }

    pub fn vector_mb(&self) -> f64 {
        bytes_to_mb(self.vector_index_bytes)
    }

    pub fn total_mb(&self) -> f64 {
        bytes_to_mb(self.storage_bytes + self.vector_index_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch_number: usize,
    pub attempts: u32,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
    pub exhausted: bool,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub index_name: String,
    pub total_documents: usize,
    pub batch_size: usize,
    pub batches_planned: usize,
    pub batches_attempted: usize,
    pub exhausted_batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
    pub cancelled: bool,
    pub elapsed_ms: u128,
}

impl IngestionSummary {
    pub fn absorb(&mut self, outcome: BatchOutcome) {
        self.batches_attempted += 1;
        if outcome.exhausted {
            self.exhausted_batches += 1;
        }
        self.succeeded += outcome.succeeded;
        self.failed += outcome.failed;
        self.failed_keys.extend(outcome.failed_keys);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioStatistics {
    pub scenario: String,
    pub index_name: String,
    pub rescoring_enabled: bool,
    pub statistics: IndexStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableStatistics {
    pub scenario: String,
    pub index_name: String,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub scenario: String,
    pub index_name: String,
    pub storage_mb: f64,
    pub storage_reduction_pct: f64,
    pub vector_mb: f64,
    pub vector_reduction_pct: f64,
    pub rescoring_enabled: bool,
}

impl ComparisonRow {
    pub fn total_mb(&self) -> f64 {
        self.storage_mb + self.vector_mb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_rejects_truncation_without_compression() {
        let err = Scenario::new("bad", CompressionType::None, Some(512), false, true, "")
            .expect_err("truncation without compression should be rejected");
        assert!(err.to_string().contains("truncate_dims requires"));
    }

    #[test]
    fn scenario_rejects_discard_without_compression_and_zero_truncation() {
        assert!(Scenario::new("bad", CompressionType::None, None, true, true, "").is_err());
        assert!(Scenario::new("bad", CompressionType::Scalar, Some(0), false, false, "").is_err());
        assert!(Scenario::new("Bad Name", CompressionType::None, None, false, true, "").is_err());
    }

    #[test]
    fn scenario_rescoring_follows_retention_policy() {
        let preserved = Scenario::new("s", CompressionType::Scalar, Some(1024), false, false, "")
            .expect("valid scenario");
        let discarded = Scenario::new("d", CompressionType::Binary, Some(1024), true, false, "")
            .expect("valid scenario");
        let plain =
            Scenario::new("p", CompressionType::None, None, false, true, "").expect("valid scenario");

        assert!(preserved.rescoring_enabled());
        assert!(!discarded.rescoring_enabled());
        assert!(!plain.rescoring_enabled());
        assert_eq!(preserved.index_name("compression-test"), "compression-test-s");
    }

    #[test]
    fn index_statistics_total_mb_combines_both_sizes() {
        let stats = IndexStatistics {
            storage_bytes: 1_048_576,
            vector_index_bytes: 524_288,
        };
        assert_eq!(stats.storage_mb(), 1.0);
        assert_eq!(stats.vector_mb(), 0.5);
        assert_eq!(stats.total_mb(), 1.5);
    }

    #[test]
    fn ingestion_summary_absorbs_batch_outcomes() {
        let mut summary = IngestionSummary::default();
        summary.absorb(BatchOutcome {
            batch_number: 1,
            attempts: 1,
            succeeded: 9,
            failed: 1,
            failed_keys: vec!["a".to_string()],
            exhausted: false,
            elapsed_ms: 3,
        });
        summary.absorb(BatchOutcome {
            batch_number: 2,
            attempts: 3,
            succeeded: 0,
            failed: 4,
            failed_keys: vec!["b".to_string(); 4],
            exhausted: true,
            elapsed_ms: 9,
        });

        assert_eq!(summary.batches_attempted, 2);
        assert_eq!(summary.exhausted_batches, 1);
        assert_eq!(summary.succeeded, 9);
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.failed_keys.len(), 5);
    }
}
