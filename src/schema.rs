use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{CompressionType, Scenario};
use crate::service::{IndexService, ServiceError};

pub const KEY_FIELD: &str = "id";
pub const TITLE_FIELD: &str = "title";
pub const CONTENT_FIELD: &str = "content";
pub const VECTOR_FIELD: &str = "embedding";

pub const VECTOR_PROFILE_NAME: &str = "default-profile";
pub const HNSW_CONFIG_NAME: &str = "hnsw-config";

// Build cost/quality knobs, held constant across the matrix.
pub const HNSW_M: u32 = 4;
pub const HNSW_EF_CONSTRUCTION: u32 = 400;
pub const HNSW_EF_SEARCH: u32 = 500;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    SingleCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub key: bool,
    pub filterable: bool,
    pub searchable: bool,
    pub hidden: bool,
    pub vector_dimensions: Option<usize>,
    pub vector_profile: Option<String>,
}

impl FieldDescriptor {
    fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::String,
            key: false,
            filterable: false,
            searchable: true,
            hidden: false,
            vector_dimensions: None,
            vector_profile: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMetric {
    Cosine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswAlgorithm {
    pub name: String,
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub metric: VectorMetric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
    pub compression: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizedDataType {
    Int8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompressionKind {
    ScalarQuantization { quantized_data_type: QuantizedDataType },
    BinaryQuantization,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescoreStorageMethod {
    PreserveOriginals,
    DiscardOriginals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescoringOptions {
    pub enable_rescoring: bool,
    pub storage_method: RescoreStorageMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: CompressionKind,
    pub truncation_dimension: Option<usize>,
    pub rescoring: RescoringOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    pub algorithms: Vec<HnswAlgorithm>,
    pub profiles: Vec<VectorProfile>,
    pub compressions: Vec<CompressionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub vector_search: VectorSearchConfig,
}

impl IndexDescriptor {
    pub fn vector_field(&self) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.field_type == FieldType::SingleCollection)
    }

    pub fn vector_dimensions(&self) -> usize {
        self.vector_field()
            .and_then(|field| field.vector_dimensions)
            .unwrap_or(0)
    }

    pub fn compression(&self) -> Option<&CompressionConfig> {
        self.vector_search.compressions.first()
    }

    /// Dimensions actually held in the vector index after truncation.
    pub fn effective_dimensions(&self) -> usize {
        let full = self.vector_dimensions();
        self.compression()
            .and_then(|compression| compression.truncation_dimension)
            .map(|dims| dims.min(full))
            .unwrap_or(full)
    }

    pub fn hnsw_m(&self) -> u32 {
        self.vector_search
            .algorithms
            .first()
            .map(|algorithm| algorithm.m)
            .unwrap_or(HNSW_M)
    }
}

pub fn build_descriptor(
    index_prefix: &str,
    scenario: &Scenario,
    vector_dimensions: usize,
) -> Result<IndexDescriptor> {
    if vector_dimensions == 0 {
        bail!("vector dimensions must be positive");
    }

    let compression = compression_config(scenario);
    if let Some(dims) = scenario.truncate_dims() {
        if dims >= vector_dimensions {
            warn!(
                scenario = scenario.name(),
                truncate_dims = dims,
                vector_dimensions,
                "truncation dimension is not below vector dimensions; truncation has no effect"
            );
        }
    }

    Ok(IndexDescriptor {
        name: scenario.index_name(index_prefix),
        fields: base_fields(vector_dimensions, scenario.stored_embedding()),
        vector_search: vector_search_config(compression),
    })
}

fn base_fields(vector_dimensions: usize, stored_embedding: bool) -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor {
            name: KEY_FIELD.to_string(),
            field_type: FieldType::String,
            key: true,
            filterable: true,
            searchable: false,
            hidden: false,
            vector_dimensions: None,
            vector_profile: None,
        },
        FieldDescriptor::text(TITLE_FIELD),
        FieldDescriptor::text(CONTENT_FIELD),
        FieldDescriptor {
            name: VECTOR_FIELD.to_string(),
            field_type: FieldType::SingleCollection,
            key: false,
            filterable: false,
            searchable: true,
            hidden: !stored_embedding,
            vector_dimensions: Some(vector_dimensions),
            vector_profile: Some(VECTOR_PROFILE_NAME.to_string()),
        },
    ]
}

fn compression_config(scenario: &Scenario) -> Option<CompressionConfig> {
    let kind = match scenario.compression_type() {
        CompressionType::None => return None,
        CompressionType::Scalar => CompressionKind::ScalarQuantization {
            quantized_data_type: QuantizedDataType::Int8,
        },
        CompressionType::Binary => CompressionKind::BinaryQuantization,
    };

    let storage_method = if scenario.discard_originals() {
        RescoreStorageMethod::DiscardOriginals
    } else {
        RescoreStorageMethod::PreserveOriginals
    };

    Some(CompressionConfig {
        name: format!("{}-compression", scenario.compression_type().as_str()),
        kind,
        truncation_dimension: scenario.truncate_dims(),
        rescoring: RescoringOptions {
            enable_rescoring: scenario.rescoring_enabled(),
            storage_method,
        },
    })
}

fn vector_search_config(compression: Option<CompressionConfig>) -> VectorSearchConfig {
    let algorithm = HnswAlgorithm {
        name: HNSW_CONFIG_NAME.to_string(),
        m: HNSW_M,
        ef_construction: HNSW_EF_CONSTRUCTION,
        ef_search: HNSW_EF_SEARCH,
        metric: VectorMetric::Cosine,
    };

    let profile = VectorProfile {
        name: VECTOR_PROFILE_NAME.to_string(),
        algorithm: HNSW_CONFIG_NAME.to_string(),
        compression: compression.as_ref().map(|config| config.name.clone()),
    };

    VectorSearchConfig {
        algorithms: vec![algorithm],
        profiles: vec![profile],
        compressions: compression.into_iter().collect(),
    }
}

/// Submits `descriptor`; an existing identical index counts as success.
pub fn create_or_update(
    service: &dyn IndexService,
    descriptor: &IndexDescriptor,
) -> Result<String, ServiceError> {
    match service.create_or_update_index(descriptor) {
        Ok(()) => {
            info!(index = %descriptor.name, "created or updated index");
            Ok(descriptor.name.clone())
        }
        Err(ServiceError::AlreadyExists(_)) => {
            info!(index = %descriptor.name, "index already exists");
            Ok(descriptor.name.clone())
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedIndex {
    pub scenario: String,
    pub index_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCreationFailure {
    pub scenario: String,
    pub index_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCreationReport {
    pub created: Vec<CreatedIndex>,
    pub failed: Vec<IndexCreationFailure>,
}

impl IndexCreationReport {
    pub fn is_created(&self, scenario: &str) -> bool {
        self.created.iter().any(|entry| entry.scenario == scenario)
    }
}

/// Creates one index per descriptor in catalog order. A failed scenario
/// is recorded and skipped; the remaining scenarios still run.
pub fn create_indexes(
    service: &dyn IndexService,
    scenarios: &[Scenario],
    descriptors: &[IndexDescriptor],
) -> IndexCreationReport {
    let mut report = IndexCreationReport::default();

    for (scenario, descriptor) in scenarios.iter().zip(descriptors) {
        match create_or_update(service, descriptor) {
            Ok(index_name) => report.created.push(CreatedIndex {
                scenario: scenario.name().to_string(),
                index_name,
                description: scenario.description().to_string(),
            }),
            Err(err) => {
                warn!(
                    scenario = scenario.name(),
                    index = %descriptor.name,
                    error = %err,
                    "index creation failed; scenario skipped"
                );
                report.failed.push(IndexCreationFailure {
                    scenario: scenario.name().to_string(),
                    index_name: descriptor.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if report.created.is_empty() {
        warn!("no indexes were created successfully");
    } else {
        for entry in &report.created {
            info!(
                index = %entry.index_name,
                configuration = %entry.description,
                "index ready"
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::define_scenarios;
    use crate::service::sqlite::SqliteIndexService;

    fn scenario(name: &str) -> Scenario {
        define_scenarios()
            .expect("catalog should build")
            .into_iter()
            .find(|scenario| scenario.name() == name)
            .expect("scenario should exist")
    }

    #[test]
    fn baseline_descriptor_has_visible_vector_and_no_compression() {
        let descriptor =
            build_descriptor("compression-test", &scenario("baseline"), 3072).expect("descriptor");

        assert_eq!(descriptor.name, "compression-test-baseline");
        assert_eq!(descriptor.fields.len(), 4);
        assert!(descriptor.fields[0].key);
        let vector = descriptor.vector_field().expect("vector field");
        assert!(!vector.hidden);
        assert_eq!(vector.vector_dimensions, Some(3072));
        assert!(descriptor.compression().is_none());
        assert!(descriptor.vector_search.profiles[0].compression.is_none());
        assert_eq!(descriptor.effective_dimensions(), 3072);
    }

    #[test]
    fn no_store_descriptor_hides_vector_field() {
        let descriptor = build_descriptor("p", &scenario("baseline-no-store"), 3072)
            .expect("descriptor");
        assert!(descriptor.vector_field().expect("vector field").hidden);
    }

    #[test]
    fn scalar_truncated_descriptor_carries_compression_block() {
        let descriptor =
            build_descriptor("p", &scenario("scalar-truncated-discard"), 3072).expect("descriptor");

        let compression = descriptor.compression().expect("compression block");
        assert_eq!(compression.name, "scalar-compression");
        assert_eq!(
            compression.kind,
            CompressionKind::ScalarQuantization {
                quantized_data_type: QuantizedDataType::Int8
            }
        );
        assert_eq!(compression.truncation_dimension, Some(1024));
        assert!(!compression.rescoring.enable_rescoring);
        assert_eq!(
            compression.rescoring.storage_method,
            RescoreStorageMethod::DiscardOriginals
        );
        assert_eq!(
            descriptor.vector_search.profiles[0].compression.as_deref(),
            Some("scalar-compression")
        );
        assert_eq!(descriptor.effective_dimensions(), 1024);
    }

    #[test]
    fn binary_descriptor_uses_binary_quantization() {
        let descriptor =
            build_descriptor("p", &scenario("binary-full"), 3072).expect("descriptor");
        let compression = descriptor.compression().expect("compression block");
        assert_eq!(compression.kind, CompressionKind::BinaryQuantization);
        assert!(compression.rescoring.enable_rescoring);
    }

    #[test]
    fn hnsw_parameters_do_not_depend_on_scenario() {
        let algorithms = define_scenarios()
            .expect("catalog should build")
            .iter()
            .map(|scenario| {
                build_descriptor("p", scenario, 3072)
                    .expect("descriptor")
                    .vector_search
                    .algorithms
            })
            .collect::<Vec<_>>();

        assert!(algorithms.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(algorithms[0][0].m, HNSW_M);
        assert_eq!(algorithms[0][0].metric, VectorMetric::Cosine);
    }

    #[test]
    fn effective_dimensions_clamp_to_full_dimensions() {
        let descriptor =
            build_descriptor("p", &scenario("binary-truncated"), 256).expect("descriptor");
        assert_eq!(descriptor.effective_dimensions(), 256);
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let descriptor =
            build_descriptor("p", &scenario("scalar-truncated"), 3072).expect("descriptor");
        let raw = serde_json::to_string(&descriptor).expect("serialize");
        assert!(raw.contains("\"kind\":\"scalar_quantization\""));
        let parsed: IndexDescriptor = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn create_or_update_treats_already_exists_as_success() {
        let service = SqliteIndexService::open_in_memory().expect("service");
        let descriptor = build_descriptor("p", &scenario("baseline"), 8).expect("descriptor");

        assert_eq!(
            create_or_update(&service, &descriptor).expect("first create"),
            "p-baseline"
        );
        assert_eq!(
            create_or_update(&service, &descriptor).expect("idempotent create"),
            "p-baseline"
        );
    }

    #[test]
    fn create_indexes_skips_rejected_scenarios() {
        let service = SqliteIndexService::open_in_memory().expect("service");
        let scenarios = define_scenarios().expect("catalog should build");
        let mut descriptors = scenarios
            .iter()
            .map(|scenario| build_descriptor("p", scenario, 8).expect("descriptor"))
            .collect::<Vec<_>>();
        descriptors[2].name = "Invalid Name".to_string();

        let report = create_indexes(&service, &scenarios, &descriptors);
        assert_eq!(report.created.len(), 7);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].scenario, "scalar-full");
        assert!(!report.is_created("scalar-full"));
        assert!(report.is_created("binary-full"));
    }
}
