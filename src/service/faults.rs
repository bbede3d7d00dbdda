use std::cell::Cell;

use sha2::{Digest, Sha256};

use crate::model::{Document, IndexStatistics, IndexingResult};
use crate::schema::IndexDescriptor;
use crate::service::{IndexService, SearchHit, SearchRequest, ServiceError};

/// Deterministic fault injection around another service.
///
/// Documents whose key hashes into the lowest `document_failure_pct`
/// buckets are always rejected, so the same documents fail in every
/// index. A batch call is failed transiently when its call sequence number
/// hashes into the lowest `batch_failure_pct` buckets.
pub struct FaultInjectingService<S> {
    inner: S,
    document_failure_pct: u8,
    batch_failure_pct: u8,
    batch_calls: Cell<u64>,
}

impl<S: IndexService> FaultInjectingService<S> {
    pub fn new(inner: S, document_failure_pct: u8, batch_failure_pct: u8) -> Self {
        Self {
            inner,
            document_failure_pct: document_failure_pct.min(100),
            batch_failure_pct: batch_failure_pct.min(100),
            batch_calls: Cell::new(0),
        }
    }
}

impl<S: IndexService> IndexService for FaultInjectingService<S> {
    fn create_or_update_index(&self, descriptor: &IndexDescriptor) -> Result<(), ServiceError> {
        self.inner.create_or_update_index(descriptor)
    }

    fn index_documents(
        &self,
        index_name: &str,
        batch: &[Document],
    ) -> Result<Vec<IndexingResult>, ServiceError> {
        let call = self.batch_calls.get();
        self.batch_calls.set(call + 1);

        if stable_bucket(&format!("batch:{call}")) < self.batch_failure_pct {
            return Err(ServiceError::Transient(format!(
                "injected transient failure on batch call {call}"
            )));
        }

        let (rejected, accepted): (Vec<&Document>, Vec<&Document>) = batch
            .iter()
            .partition(|document| stable_bucket(&document.id) < self.document_failure_pct);

        let forwarded = accepted.into_iter().cloned().collect::<Vec<Document>>();
        let mut results = if forwarded.is_empty() {
            Vec::new()
        } else {
            self.inner.index_documents(index_name, &forwarded)?
        };

        results.extend(rejected.into_iter().map(|document| IndexingResult {
            key: document.id.clone(),
            succeeded: false,
            error_detail: Some("injected permanent document failure".to_string()),
        }));

        Ok(results)
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

/// Maps `value` onto 0..100 using the leading digest bytes.
fn stable_bucket(value: &str) -> u8 {
    let digest = Sha256::digest(value.as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(prefix) % 100) as u8
}
