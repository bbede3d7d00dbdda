use tracing::{info, warn};

use crate::model::{IndexStatistics, Scenario, ScenarioStatistics, UnavailableStatistics};
use crate::retry::{Attempt, CancellationToken, RetryOutcome, RetryPolicy, Sleeper};
use crate::service::{IndexService, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub enum StatisticsOutcome {
    Available {
        statistics: IndexStatistics,
        attempts: u32,
    },
    Unavailable {
        reason: String,
        attempts: u32,
    },
}

/// Polls index statistics, which lag behind writes.
pub struct StatisticsCollector<'a> {
    service: &'a dyn IndexService,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancellationToken,
    policy: RetryPolicy,
}

impl<'a> StatisticsCollector<'a> {
    pub fn new(
        service: &'a dyn IndexService,
        sleeper: &'a dyn Sleeper,
        cancel: &'a CancellationToken,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            sleeper,
            cancel,
            policy,
        }
    }

    pub fn collect(&self, index_name: &str) -> StatisticsOutcome {
        let operation = format!("statistics {index_name}");
        let outcome = self
            .policy
            .run(&operation, self.sleeper, self.cancel, |_| {
                classify(self.service.get_index_statistics(index_name))
            });

        match outcome {
            RetryOutcome::Ready { value, attempts } => {
                info!(
                    index = index_name,
                    attempts,
                    storage_bytes = value.storage_bytes,
                    vector_index_bytes = value.vector_index_bytes,
                    total_mb = value.total_mb(),
                    "collected index statistics"
                );
                StatisticsOutcome::Available {
                    statistics: value,
                    attempts,
                }
            }
            other => {
                let attempts = other.attempts();
                let reason = match other {
                    RetryOutcome::Failed { error, .. } => error.to_string(),
                    RetryOutcome::Exhausted {
                        last_error: Some(error),
                        ..
                    } => format!("not available after {attempts} attempts: {error}"),
                    RetryOutcome::Cancelled { .. } => "cancelled".to_string(),
                    _ => format!("not available after {attempts} attempts"),
                };
                warn!(
                    index = index_name,
                    attempts,
                    reason = %reason,
                    "failed to get index statistics; scenario excluded from comparison"
                );
                StatisticsOutcome::Unavailable { reason, attempts }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectedStatistics {
    pub available: Vec<ScenarioStatistics>,
    pub unavailable: Vec<UnavailableStatistics>,
}

impl StatisticsCollector<'_> {
    /// One poll sequence per scenario, in the order given.
    pub fn collect_scenarios(
        &self,
        index_prefix: &str,
        scenarios: &[&Scenario],
    ) -> CollectedStatistics {
        let mut collected = CollectedStatistics::default();

        for scenario in scenarios {
            let index_name = scenario.index_name(index_prefix);
            match self.collect(&index_name) {
                StatisticsOutcome::Available { statistics, .. } => {
                    collected.available.push(ScenarioStatistics {
                        scenario: scenario.name().to_string(),
                        index_name,
                        rescoring_enabled: scenario.rescoring_enabled(),
                        statistics,
                    })
                }
                StatisticsOutcome::Unavailable { reason, attempts } => {
                    collected.unavailable.push(UnavailableStatistics {
                        scenario: scenario.name().to_string(),
                        index_name,
                        attempts,
                        reason,
                    })
                }
            }
        }

        collected
    }
}

fn classify(
    result: Result<IndexStatistics, ServiceError>,
) -> Attempt<IndexStatistics, ServiceError> {
    match result {
        Ok(statistics) => Attempt::Ready(statistics),
        Err(err) if err.is_retryable() => Attempt::NotYet(err),
        Err(err) => Attempt::Failed(err),
    }
}
