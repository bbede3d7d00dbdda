use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::info;

use crate::model::Document;
use crate::semantic::{decode_embedding_blob, embed_text_local, encode_embedding_blob};
use crate::util::{encode_key, now_utc_string};

const DATASET_SCHEMA_VERSION: &str = "1";

const TOPICS: &[(&str, &[&str])] = &[
    (
        "Archaeopteryx",
        &["feathered", "dinosaur", "jurassic", "fossil", "avian", "wings"],
    ),
    (
        "Danube",
        &["river", "europe", "delta", "navigation", "basin", "tributary"],
    ),
    (
        "Baroque",
        &["music", "composer", "counterpoint", "opera", "harpsichord", "era"],
    ),
    (
        "Photosynthesis",
        &["chlorophyll", "light", "carbon", "glucose", "plant", "energy"],
    ),
    (
        "Byzantium",
        &["empire", "constantinople", "emperor", "mosaic", "church", "trade"],
    ),
    (
        "Volcano",
        &["magma", "eruption", "crater", "lava", "tectonic", "ash"],
    ),
    (
        "Semiconductor",
        &["silicon", "transistor", "doping", "band", "wafer", "circuit"],
    ),
    (
        "Tundra",
        &["permafrost", "arctic", "lichen", "caribou", "cold", "biome"],
    ),
];

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub source_key: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Deterministic record `ordinal` of a synthetic encyclopedia-like corpus.
pub fn synthetic_record(ordinal: usize, dimensions: usize) -> SourceRecord {
    let (topic, words) = TOPICS[ordinal % TOPICS.len()];
    let variant = ordinal / TOPICS.len();
    let title = format!("{topic} {variant}");

    let content = (0..12)
        .map(|position| words[(ordinal + position * (variant + 1)) % words.len()])
        .collect::<Vec<&str>>()
        .join(" ");
    let content = format!("{title} is an article about {content}.");
    let embedding = embed_text_local(&format!("{title}\n{content}"), dimensions);

    SourceRecord {
        source_key: format!("<dbpedia:{topic}_{variant}>"),
        title,
        content,
        embedding,
    }
}

pub fn generate_dataset(path: &Path, rows: usize, dimensions: usize) -> Result<usize> {
    if dimensions == 0 {
        bail!("dataset dimensions must be positive");
    }

    let mut connection = open_dataset(path)?;
    ensure_dataset_schema(&connection)?;

    let tx = connection.transaction()?;
    tx.execute("DELETE FROM documents", [])?;
    {
        let mut statement = tx.prepare(
            "
            INSERT INTO documents(ordinal, source_key, title, content, embedding, embedding_dim)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )?;
        for ordinal in 0..rows {
            let record = synthetic_record(ordinal, dimensions);
            statement.execute(params![
                ordinal as i64,
                record.source_key,
                record.title,
                record.content,
                encode_embedding_blob(&record.embedding),
                dimensions as i64,
            ])?;

            if ordinal > 0 && ordinal % 1000 == 0 {
                info!(rows = ordinal, "generated documents");
            }
        }
    }
    upsert_metadata(&tx, "schema_version", DATASET_SCHEMA_VERSION)?;
    upsert_metadata(&tx, "embedding_dim", &dimensions.to_string())?;
    upsert_metadata(&tx, "row_count", &rows.to_string())?;
    upsert_metadata(&tx, "generated_at", &now_utc_string())?;
    tx.commit()?;

    Ok(rows)
}

/// Reads every document in ordinal order. Any row whose embedding does
/// not have `expected_dimensions` components aborts the load.
pub fn load_documents(path: &Path, expected_dimensions: usize) -> Result<Vec<Document>> {
    if !path.exists() {
        bail!("dataset not found: {}", path.display());
    }

    let connection = open_dataset(path)?;
    load_documents_from(&connection, expected_dimensions)
}

fn load_documents_from(connection: &Connection, expected_dimensions: usize) -> Result<Vec<Document>> {
    let mut statement = connection
        .prepare(
            "
            SELECT source_key, title, content, embedding, embedding_dim
            FROM documents
            ORDER BY ordinal ASC
            ",
        )
        .context("failed to query dataset documents")?;

    let mut rows = statement.query([])?;
    let mut documents = Vec::<Document>::new();

    while let Some(row) = rows.next()? {
        let source_key: String = row.get(0)?;
        let embedding_dim = row.get::<_, i64>(4)? as usize;
        if embedding_dim != expected_dimensions {
            bail!(
                "embedding dimension mismatch for {source_key}: dataset has {embedding_dim}, index expects {expected_dimensions}"
            );
        }

        let blob: Vec<u8> = row.get(3)?;
        let embedding = decode_embedding_blob(&blob, expected_dimensions)
            .with_context(|| format!("invalid embedding blob for {source_key}"))?;

        documents.push(Document {
            id: encode_key(&source_key),
            title: row.get(1)?,
            content: row.get(2)?,
            embedding,
        });
    }

    info!(documents = documents.len(), "loaded dataset documents");
    Ok(documents)
}

fn open_dataset(path: &Path) -> Result<Connection> {
    let connection = Connection::open(path)
        .with_context(|| format!("failed to open dataset: {}", path.display()))?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL for dataset")?;
    Ok(connection)
}

fn ensure_dataset_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
              ordinal INTEGER PRIMARY KEY,
              source_key TEXT NOT NULL UNIQUE,
              title TEXT NOT NULL,
              content TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL
            );
            ",
        )
        .context("failed to create dataset schema")
}

fn upsert_metadata(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection.execute(
        "
        INSERT INTO metadata(key, value) VALUES(?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value
        ",
        params![key, value],
    )?;
    Ok(())
}
