use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::model::{Document, IndexStatistics, IndexingResult};
use crate::schema::{CompressionKind, IndexDescriptor, RescoreStorageMethod};
use crate::semantic::{
    cosine_similarity, decode_embedding_blob, encode_embedding_blob, truncate_embedding,
};
use crate::service::{IndexService, SearchHit, SearchRequest, ServiceError};
use crate::util::now_utc_string;

const MAX_INDEX_NAME_LEN: usize = 128;

/// Local index service over a single SQLite file. Sizes reported by
/// [`IndexService::get_index_statistics`] are derived from what each
/// descriptor says the index keeps, not from SQLite page usage.
pub struct SqliteIndexService {
    connection: Connection,
    settle_window: Duration,
}

impl SqliteIndexService {
    pub fn open(path: &Path, settle_window: Duration, operation_timeout: Duration) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open index service db: {}", path.display()))?;
        connection
            .busy_timeout(operation_timeout)
            .context("failed to set busy_timeout for index service")?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL for index service")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL for index service")?;

        let service = Self {
            connection,
            settle_window,
        };
        service.ensure_schema()?;
        Ok(service)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory index service")?;
        let service = Self {
            connection,
            settle_window: Duration::ZERO,
        };
        service.ensure_schema()?;
        Ok(service)
    }

    #[cfg(test)]
    pub fn with_settle_window(mut self, settle_window: Duration) -> Self {
        self.settle_window = settle_window;
        self
    }

    fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS indexes (
                  name TEXT PRIMARY KEY,
                  descriptor_json TEXT NOT NULL,
                  created_at TEXT NOT NULL,
                  updated_at TEXT NOT NULL,
                  last_write_ms INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS index_documents (
                  index_name TEXT NOT NULL,
                  doc_key TEXT NOT NULL,
                  title TEXT NOT NULL,
                  content TEXT NOT NULL,
                  embedding BLOB NOT NULL,
                  PRIMARY KEY(index_name, doc_key),
                  FOREIGN KEY(index_name) REFERENCES indexes(name)
                );
                ",
            )
            .context("failed to create index service schema")
    }

    fn load_index(&self, name: &str) -> Result<(IndexDescriptor, i64), ServiceError> {
        let row = self
            .connection
            .query_row(
                "SELECT descriptor_json, last_write_ms FROM indexes WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((raw, last_write_ms)) = row else {
            return Err(ServiceError::NotFound(name.to_string()));
        };

        Ok((serde_json::from_str(&raw)?, last_write_ms))
    }

    fn document_stats(&self, name: &str) -> Result<(u64, u64), ServiceError> {
        let (count, text_bytes) = self.connection.query_row(
            "
            SELECT
              COUNT(*),
              COALESCE(SUM(
                length(CAST(doc_key AS BLOB))
                + length(CAST(title AS BLOB))
                + length(CAST(content AS BLOB))
              ), 0)
            FROM index_documents
            WHERE index_name = ?1
            ",
            params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok((count.max(0) as u64, text_bytes.max(0) as u64))
    }
}

impl IndexService for SqliteIndexService {
    fn create_or_update_index(&self, descriptor: &IndexDescriptor) -> Result<(), ServiceError> {
        validate_index_name(&descriptor.name)?;
        if descriptor.vector_dimensions() == 0 {
            return Err(ServiceError::Rejected(format!(
                "index {} has no vector field with dimensions",
                descriptor.name
            )));
        }

        let existing = match self.load_index(&descriptor.name) {
            Ok((stored, _)) => Some(stored),
            Err(ServiceError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        if existing.as_ref() == Some(descriptor) {
            return Err(ServiceError::AlreadyExists(descriptor.name.clone()));
        }

        let raw = serde_json::to_string(descriptor)?;
        let now = now_utc_string();
        let tx = self.connection.unchecked_transaction()?;
        if existing.is_some() {
            // Vector configuration changed: stored documents no longer fit.
            tx.execute(
                "DELETE FROM index_documents WHERE index_name = ?1",
                params![descriptor.name],
            )?;
        }
        tx.execute(
            "
            INSERT INTO indexes(name, descriptor_json, created_at, updated_at, last_write_ms)
            VALUES(?1, ?2, ?3, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
              descriptor_json=excluded.descriptor_json,
              updated_at=excluded.updated_at,
              last_write_ms=excluded.last_write_ms
            ",
            params![descriptor.name, raw, now, now_millis()],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn index_documents(
        &self,
        index_name: &str,
        batch: &[Document],
    ) -> Result<Vec<IndexingResult>, ServiceError> {
        let (descriptor, _) = self.load_index(index_name)?;
        let dimensions = descriptor.vector_dimensions();

        let tx = self.connection.unchecked_transaction()?;
        let mut results = Vec::<IndexingResult>::with_capacity(batch.len());
        {
            let mut statement = tx.prepare_cached(
                "
                INSERT INTO index_documents(index_name, doc_key, title, content, embedding)
                VALUES(?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(index_name, doc_key) DO UPDATE SET
                  title=excluded.title,
                  content=excluded.content,
                  embedding=excluded.embedding
                ",
            )?;

            for document in batch {
                if let Some(detail) = document_rejection(document, dimensions) {
                    results.push(IndexingResult {
                        key: document.id.clone(),
                        succeeded: false,
                        error_detail: Some(detail),
                    });
                    continue;
                }

                statement.execute(params![
                    index_name,
                    document.id,
                    document.title,
                    document.content,
                    encode_embedding_blob(&document.embedding),
                ])?;
                results.push(IndexingResult {
                    key: document.id.clone(),
                    succeeded: true,
                    error_detail: None,
                });
            }
        }
        tx.execute(
            "UPDATE indexes SET last_write_ms = ?2 WHERE name = ?1",
            params![index_name, now_millis()],
        )?;
        tx.commit()?;

        debug!(index = index_name, documents = batch.len(), "batch indexed");
        Ok(results)
    }

    fn get_index_statistics(&self, index_name: &str) -> Result<IndexStatistics, ServiceError> {
        let (descriptor, last_write_ms) = self.load_index(index_name)?;

        let settle_ms = self.settle_window.as_millis() as i64;
        if settle_ms > 0 && now_millis().saturating_sub(last_write_ms) < settle_ms {
            return Err(ServiceError::Transient(format!(
                "statistics for {index_name} are not yet available"
            )));
        }

        let (document_count, text_bytes) = self.document_stats(index_name)?;
        Ok(estimate_statistics(&descriptor, document_count, text_bytes))
    }

    fn search(
        &self,
        index_name: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let (descriptor, _) = self.load_index(index_name)?;
        let dimensions = descriptor.vector_dimensions();
        if request.vector.len() != dimensions {
            return Err(ServiceError::Rejected(format!(
                "query vector has {} dimensions, index {index_name} expects {dimensions}",
                request.vector.len()
            )));
        }

        let effective = descriptor.effective_dimensions();
        let query = truncate_embedding(&request.vector, effective);

        let mut statement = self.connection.prepare_cached(
            "SELECT doc_key, title, embedding FROM index_documents WHERE index_name = ?1",
        )?;
        let mut rows = statement.query(params![index_name])?;
        let mut hits = Vec::<SearchHit>::new();

        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(2)?;
            let Some(embedding) = decode_embedding_blob(&blob, dimensions) else {
                continue;
            };
            hits.push(SearchHit {
                key: row.get(0)?,
                title: row.get(1)?,
                score: cosine_similarity(&query, &truncate_embedding(&embedding, effective)),
            });
        }

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.key.cmp(&right.key))
        });
        hits.truncate(request.top.min(request.k_nearest.max(1)));

        Ok(hits)
    }
}

/// Storage model for one index holding `document_count` documents.
///
/// The vector index holds one quantized vector per document plus HNSW
/// links. Storage holds the text fields, the retrievable vector when the
/// field is not hidden, and the full-precision originals kept for
/// rescoring.
pub fn estimate_statistics(
    descriptor: &IndexDescriptor,
    document_count: u64,
    text_bytes: u64,
) -> IndexStatistics {
    let full_vector_bytes = descriptor.vector_dimensions() as u64 * 4;
    let effective = descriptor.effective_dimensions() as u64;

    let (quantized_bytes, retains_originals) = match descriptor.compression() {
        None => (effective * 4, false),
        Some(compression) => {
            let bytes = match compression.kind {
                CompressionKind::ScalarQuantization { .. } => effective,
                CompressionKind::BinaryQuantization => effective.div_ceil(8),
            };
            (
                bytes,
                compression.rescoring.storage_method == RescoreStorageMethod::PreserveOriginals,
            )
        }
    };

    let retrievable = descriptor
        .vector_field()
        .map(|field| !field.hidden)
        .unwrap_or(false);

    let mut storage_bytes = text_bytes;
    if retrievable {
        storage_bytes += document_count * full_vector_bytes;
    }
    if retains_originals {
        storage_bytes += document_count * full_vector_bytes;
    }

    let link_bytes = 2 * u64::from(descriptor.hnsw_m()) * 4;

    IndexStatistics {
        storage_bytes,
        vector_index_bytes: document_count * (quantized_bytes + link_bytes),
    }
}

fn validate_index_name(name: &str) -> Result<(), ServiceError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if name.len() < 2
        || name.len() > MAX_INDEX_NAME_LEN
        || !valid_chars
        || name.starts_with('-')
        || name.ends_with('-')
    {
        return Err(ServiceError::Rejected(format!("invalid index name: {name}")));
    }
    Ok(())
}

fn document_rejection(document: &Document, dimensions: usize) -> Option<String> {
    if document.id.is_empty() {
        return Some("document key is empty".to_string());
    }
    if !document
        .id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=')
    {
        return Some(format!("invalid document key: {}", document.id));
    }
    if document.embedding.len() != dimensions {
        return Some(format!(
            "embedding has {} dimensions, expected {dimensions}",
            document.embedding.len()
        ));
    }
    if document.embedding.iter().any(|value| !value.is_finite()) {
        return Some("embedding contains non-finite values".to_string());
    }
    None
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
