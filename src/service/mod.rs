//! Index-service capability consumed by the harness.
//!
//! The harness only ever talks to an index service through
//! [`IndexService`]. [`sqlite::SqliteIndexService`] is the local reference
//! backend; [`faults::FaultInjectingService`] wraps any backend to exercise
//! the failure paths.

pub mod faults;
pub mod sqlite;

use serde::Serialize;

use crate::model::{Document, IndexStatistics, IndexingResult};
use crate::schema::IndexDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("index not found: {0}")]
    NotFound(String),

    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query_text: String,
    pub vector: Vec<f32>,
    pub k_nearest: usize,
    pub top: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub key: String,
    pub title: String,
    pub score: f64,
}

pub trait IndexService {
    fn create_or_update_index(&self, descriptor: &IndexDescriptor) -> Result<(), ServiceError>;

    /// Uploads `batch`. A successful call may still report individual
    /// documents as failed.
    fn index_documents(
        &self,
        index_name: &str,
        batch: &[Document],
    ) -> Result<Vec<IndexingResult>, ServiceError>;

    /// Not real-time: may return `Transient` shortly after a write.
    fn get_index_statistics(&self, index_name: &str) -> Result<IndexStatistics, ServiceError>;

    fn search(
        &self,
        index_name: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, ServiceError>;
}
