use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::ingestion::IngestionSettings;
use crate::retry::RetryPolicy;

pub const DEFAULT_INDEX_PREFIX: &str = "compression-test";
pub const DEFAULT_VECTOR_DIMENSIONS: usize = 3072;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub index_prefix: String,
    pub vector_dimensions: usize,
    pub batch_size: usize,
    pub upload_max_attempts: u32,
    pub upload_base_delay_ms: u64,
    pub batch_pause_ms: u64,
    pub stats_max_attempts: u32,
    pub stats_base_delay_ms: u64,
    pub operation_timeout_ms: u64,
    pub service_settle_ms: u64,
    pub deadline_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            vector_dimensions: DEFAULT_VECTOR_DIMENSIONS,
            batch_size: 100,
            upload_max_attempts: 3,
            upload_base_delay_ms: 2000,
            batch_pause_ms: 250,
            stats_max_attempts: 10,
            stats_base_delay_ms: 1000,
            operation_timeout_ms: 30_000,
            service_settle_ms: 1500,
            deadline_secs: None,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub index_prefix: Option<String>,
    pub vector_dimensions: Option<usize>,
    pub batch_size: Option<usize>,
    pub stats_max_attempts: Option<u32>,
    pub deadline_secs: Option<u64>,
}

impl HarnessConfig {
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_slice::<HarnessConfig>(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => HarnessConfig::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(prefix) = &overrides.index_prefix {
            self.index_prefix = prefix.clone();
        }
        if let Some(dimensions) = overrides.vector_dimensions {
            self.vector_dimensions = dimensions;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(attempts) = overrides.stats_max_attempts {
            self.stats_max_attempts = attempts;
        }
        if overrides.deadline_secs.is_some() {
            self.deadline_secs = overrides.deadline_secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_prefix.trim().is_empty() {
            bail!("index_prefix must not be empty");
        }
        if self.vector_dimensions == 0 {
            bail!("vector_dimensions must be positive");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.upload_max_attempts == 0 {
            bail!("upload_max_attempts must be positive");
        }
        if self.stats_max_attempts == 0 {
            bail!("stats_max_attempts must be positive");
        }
        Ok(())
    }

    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            batch_size: self.batch_size,
            retry: RetryPolicy::new(
                self.upload_max_attempts,
                Duration::from_millis(self.upload_base_delay_ms),
            ),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        }
    }

    pub fn statistics_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.stats_max_attempts,
            Duration::from_millis(self.stats_base_delay_ms),
        )
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn service_settle_window(&self) -> Duration {
        Duration::from_millis(self.service_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_config_falls_back_to_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{ "batch_size": 50, "index_prefix": "dbpediaindex" }"#)
                .expect("config should parse");

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.index_prefix, "dbpediaindex");
        assert_eq!(config.vector_dimensions, DEFAULT_VECTOR_DIMENSIONS);
        assert_eq!(config.upload_max_attempts, 3);
        assert!(config.deadline_secs.is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = HarnessConfig::default();
        config.apply(&ConfigOverrides {
            vector_dimensions: Some(8),
            batch_size: Some(10),
            deadline_secs: Some(60),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.vector_dimensions, 8);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.deadline_secs, Some(60));
        assert_eq!(config.index_prefix, DEFAULT_INDEX_PREFIX);
    }

    #[test]
    fn validate_rejects_zero_batch_size_and_dimensions() {
        let mut config = HarnessConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.vector_dimensions = 0;
        assert!(config.validate().is_err());

        assert!(HarnessConfig::default().validate().is_ok());
    }

    #[test]
    fn derived_policies_use_configured_delays() {
        let config = HarnessConfig::default();
        let ingestion = config.ingestion_settings();
        assert_eq!(ingestion.retry.max_attempts, 3);
        assert_eq!(ingestion.retry.delay_for(0), Duration::from_millis(2000));
        assert_eq!(ingestion.batch_pause, Duration::from_millis(250));
        assert_eq!(config.statistics_policy().delay_for(2), Duration::from_secs(4));
    }
}
