use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::model::{BatchOutcome, Document, IndexingResult, IngestionSummary};
use crate::retry::{Attempt, CancellationToken, RetryOutcome, RetryPolicy, Sleeper};
use crate::service::IndexService;
use crate::util::chunk_list;

#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub batch_pause: Duration,
}

/// Uploads a document set to one index, batch by batch, in order.
pub struct BatchIngestionEngine<'a> {
    service: &'a dyn IndexService,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancellationToken,
    settings: IngestionSettings,
}

impl<'a> BatchIngestionEngine<'a> {
    pub fn new(
        service: &'a dyn IndexService,
        sleeper: &'a dyn Sleeper,
        cancel: &'a CancellationToken,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            service,
            sleeper,
            cancel,
            settings,
        }
    }

    /// Every document ends up counted exactly once as succeeded or failed,
    /// including documents in exhausted or cancelled batches.
    pub fn ingest(&self, documents: &[Document], index_name: &str) -> IngestionSummary {
        let started = Instant::now();
        let batch_size = self.settings.batch_size.max(1);
        let batches = chunk_list(documents, batch_size);
        let total_batches = batches.len();

        let mut summary = IngestionSummary {
            index_name: index_name.to_string(),
            total_documents: documents.len(),
            batch_size,
            batches_planned: total_batches,
            ..IngestionSummary::default()
        };

        info!(
            index = index_name,
            total_documents = documents.len(),
            total_batches,
            batch_size,
            "uploading documents"
        );

        for (batch_index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let remaining = &documents[batch_index * batch_size..];
                warn!(
                    index = index_name,
                    remaining_documents = remaining.len(),
                    "ingestion cancelled; remaining documents counted as failed"
                );
                summary.failed += remaining.len();
                summary
                    .failed_keys
                    .extend(remaining.iter().map(|document| document.id.clone()));
                summary.cancelled = true;
                break;
            }

            let outcome = self.upload_batch(index_name, batch_index + 1, batch);
            let was_uploaded = !outcome.exhausted;
            summary.absorb(outcome);

            info!(
                index = index_name,
                batch = batch_index + 1,
                total_batches,
                uploaded = summary.succeeded,
                failed = summary.failed,
                total_documents = documents.len(),
                elapsed_s = started.elapsed().as_secs(),
                "batch processed"
            );

            if was_uploaded && batch_index + 1 < total_batches && !self.settings.batch_pause.is_zero()
            {
                self.sleeper.sleep(self.settings.batch_pause, self.cancel);
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        info!(
            index = index_name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            exhausted_batches = summary.exhausted_batches,
            elapsed_s = started.elapsed().as_secs(),
            "upload finished"
        );

        summary
    }

    fn upload_batch(&self, index_name: &str, batch_number: usize, batch: &[Document]) -> BatchOutcome {
        let started = Instant::now();
        let operation = format!("upload {index_name} batch {batch_number}");

        let outcome = self
            .settings
            .retry
            .run(&operation, self.sleeper, self.cancel, |_| {
                match self.service.index_documents(index_name, batch) {
                    Ok(results) => Attempt::Ready(results),
                    Err(err) if err.is_retryable() => Attempt::NotYet(err),
                    Err(err) => Attempt::Failed(err),
                }
            });
        let attempts = outcome.attempts();

        match outcome {
            RetryOutcome::Ready { value, .. } => {
                let (succeeded, failed_keys) = tally_results(batch, &value);
                for result in value.iter().filter(|result| !result.succeeded) {
                    warn!(
                        index = index_name,
                        key = %result.key,
                        error = result.error_detail.as_deref().unwrap_or("unknown"),
                        "failed to upload document"
                    );
                }
                BatchOutcome {
                    batch_number,
                    attempts,
                    succeeded,
                    failed: failed_keys.len(),
                    failed_keys,
                    exhausted: false,
                    elapsed_ms: started.elapsed().as_millis(),
                }
            }
            other => {
                let reason = match other {
                    RetryOutcome::Failed { error, .. } => error.to_string(),
                    RetryOutcome::Exhausted {
                        last_error: Some(error),
                        ..
                    } => error.to_string(),
                    RetryOutcome::Cancelled { .. } => "cancelled".to_string(),
                    _ => "no attempt made".to_string(),
                };
                warn!(
                    index = index_name,
                    batch = batch_number,
                    attempts,
                    documents = batch.len(),
                    error = %reason,
                    "batch failed after retries"
                );
                BatchOutcome {
                    batch_number,
                    attempts,
                    succeeded: 0,
                    failed: batch.len(),
                    failed_keys: batch.iter().map(|document| document.id.clone()).collect(),
                    exhausted: true,
                    elapsed_ms: started.elapsed().as_millis(),
                }
            }
        }
    }
}

/// Documents the service did not explicitly acknowledge count as failed.
fn tally_results(batch: &[Document], results: &[IndexingResult]) -> (usize, Vec<String>) {
    let acknowledged = results
        .iter()
        .filter(|result| result.succeeded)
        .map(|result| result.key.as_str())
        .collect::<HashSet<&str>>();

    let mut succeeded = 0usize;
    let mut failed_keys = Vec::<String>::new();
    for document in batch {
        if acknowledged.contains(document.id.as_str()) {
            succeeded += 1;
        } else {
            failed_keys.push(document.id.clone());
        }
    }

    (succeeded, failed_keys)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::model::{CompressionType, IndexStatistics, Scenario};
    use crate::retry::testing::RecordingSleeper;
    use crate::schema::{IndexDescriptor, build_descriptor};
    use crate::service::faults::FaultInjectingService;
    use crate::service::sqlite::SqliteIndexService;
    use crate::service::{SearchHit, SearchRequest, ServiceError};
    use crate::util::encode_key;

    fn settings(batch_size: usize) -> IngestionSettings {
        IngestionSettings {
            batch_size,
            retry: RetryPolicy::new(3, Duration::from_millis(2000)),
            batch_pause: Duration::from_millis(250),
        }
    }

    fn documents(count: usize) -> Vec<Document> {
        (0..count)
            .map(|index| Document {
                id: encode_key(&format!("<dbpedia:Doc_{index}>")),
                title: format!("Doc {index}"),
                content: format!("content {index}"),
                embedding: vec![1.0, 0.0],
            })
            .collect()
    }

    fn service_with_index() -> SqliteIndexService {
        let service = SqliteIndexService::open_in_memory().expect("service");
        let scenario = Scenario::new("baseline", CompressionType::None, None, false, true, "")
            .expect("scenario");
        let descriptor = build_descriptor("i", &scenario, 2).expect("descriptor");
        service.create_or_update_index(&descriptor).expect("create");
        service
    }

    /// Fails the first `failures` calls transiently, then delegates.
    struct FlakyService {
        inner: SqliteIndexService,
        failures: Cell<u32>,
        calls: Cell<u32>,
    }

    impl IndexService for FlakyService {
        fn create_or_update_index(&self, descriptor: &IndexDescriptor) -> Result<(), ServiceError> {
            self.inner.create_or_update_index(descriptor)
        }

        fn index_documents(
            &self,
            index_name: &str,
            batch: &[Document],
        ) -> Result<Vec<IndexingResult>, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(ServiceError::Transient("throttled".to_string()));
            }
            self.inner.index_documents(index_name, batch)
        }

        fn get_index_statistics(&self, index_name: &str) -> Result<IndexStatistics, ServiceError> {
            self.inner.get_index_statistics(index_name)
        }

        fn search(
            &self,
            index_name: &str,
            request: &SearchRequest,
        ) -> Result<Vec<SearchHit>, ServiceError> {
            self.inner.search(index_name, request)
        }
    }

    #[test]
    fn ingest_uploads_every_batch_and_pauses_between_them() {
        let service = service_with_index();
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let engine = BatchIngestionEngine::new(&service, &sleeper, &cancel, settings(3));

        let summary = engine.ingest(&documents(10), "i-baseline");

        assert_eq!(summary.batches_planned, 4);
        assert_eq!(summary.batches_attempted, 4);
        assert_eq!(summary.succeeded, 10);
        assert_eq!(summary.failed, 0);
        assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_millis(250); 3]);
    }

    #[test]
    fn ingest_retries_transient_failures_with_backoff() {
        let flaky = FlakyService {
            inner: service_with_index(),
            failures: Cell::new(2),
            calls: Cell::new(0),
        };
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let engine = BatchIngestionEngine::new(&flaky, &sleeper, &cancel, settings(100));

        let summary = engine.ingest(&documents(5), "i-baseline");

        assert_eq!(flaky.calls.get(), 3);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.exhausted_batches, 0);
        assert_eq!(
            *sleeper.sleeps.borrow(),
            vec![Duration::from_millis(2000), Duration::from_millis(4000)]
        );
    }

    #[test]
    fn exhausted_batch_counts_every_document_failed_and_continues() {
        let flaky = FlakyService {
            inner: service_with_index(),
            failures: Cell::new(3),
            calls: Cell::new(0),
        };
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let engine = BatchIngestionEngine::new(&flaky, &sleeper, &cancel, settings(4));

        let docs = documents(10);
        let summary = engine.ingest(&docs, "i-baseline");

        assert_eq!(summary.exhausted_batches, 1);
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.succeeded, 6);
        assert_eq!(summary.failed_keys, docs[..4].iter().map(|d| d.id.clone()).collect::<Vec<_>>());
        assert_eq!(summary.batches_attempted, 3);
    }

    #[test]
    fn permanent_document_failures_are_counted_without_retry() {
        let service = FaultInjectingService::new(service_with_index(), 10, 0);
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let engine = BatchIngestionEngine::new(&service, &sleeper, &cancel, settings(50));

        let summary = engine.ingest(&documents(500), "i-baseline");

        assert_eq!(summary.succeeded + summary.failed, 500);
        assert!(summary.failed > 0);
        assert_eq!(summary.exhausted_batches, 0);
        assert_eq!(summary.failed_keys.len(), summary.failed);
    }

    #[test]
    fn non_retryable_error_fails_batch_immediately() {
        let service = SqliteIndexService::open_in_memory().expect("service");
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let engine = BatchIngestionEngine::new(&service, &sleeper, &cancel, settings(2));

        let summary = engine.ingest(&documents(3), "i-missing");

        assert_eq!(summary.failed, 3);
        assert_eq!(summary.exhausted_batches, 2);
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn cancelled_ingestion_accounts_for_remaining_documents() {
        let service = service_with_index();
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = BatchIngestionEngine::new(&service, &sleeper, &cancel, settings(3));

        let summary = engine.ingest(&documents(7), "i-baseline");

        assert!(summary.cancelled);
        assert_eq!(summary.batches_attempted, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 7);
    }

    #[test]
    fn tally_results_treats_missing_results_as_failed() {
        let docs = documents(3);
        let results = vec![IndexingResult {
            key: docs[1].id.clone(),
            succeeded: true,
            error_detail: None,
        }];

        let (succeeded, failed_keys) = tally_results(&docs, &results);
        assert_eq!(succeeded, 1);
        assert_eq!(failed_keys, vec![docs[0].id.clone(), docs[2].id.clone()]);
    }
}
