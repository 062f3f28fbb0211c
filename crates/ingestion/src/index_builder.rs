//! Vector index construction from the datastore
//!
//! Abstract records become nodes of the main index, PICO text becomes one
//! index per field combination and full texts are chunked into the
//! fulltext index.

use crate::chunker::{chunk_document, ChunkingConfig};
use crate::errors::Result;
use litfunnel_common::{
    db::AbstractRecord,
    embeddings::Embedder,
    vector::{pico_combinations, Metadata, VectorDocument, VectorIndex},
};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Longest serialized metadata kept without trimming the author list
pub const MAX_METADATA_LENGTH: usize = 1024;

/// Authors kept when metadata is trimmed
pub const MAX_AUTHORS: usize = 5;

/// Node metadata for an abstract record
pub fn record_metadata(record: &AbstractRecord) -> Metadata {
    let text = |value: &Option<String>| match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    };

    let mut metadata = Metadata::new();
    metadata.insert("source".into(), Value::String(record.document_id.clone()));
    metadata.insert("title".into(), text(&record.title));
    metadata.insert("authors".into(), text(&record.authors));
    metadata.insert("year".into(), record.year.map(Value::from).unwrap_or(Value::Null));
    metadata.insert("pico_p".into(), text(&record.pico_p));
    metadata.insert("pico_i".into(), text(&record.pico_i));
    metadata.insert("pico_c".into(), text(&record.pico_c));
    metadata.insert("pico_o".into(), text(&record.pico_o));

    if metadata_length(&metadata) > MAX_METADATA_LENGTH {
        reduce_authors(&mut metadata, MAX_AUTHORS);
    }
    metadata
}

fn metadata_length(metadata: &Metadata) -> usize {
    Value::Object(metadata.clone()).to_string().chars().count()
}

/// Keep the first `max_authors` comma-separated authors, adding `et al.`
/// when any were dropped
pub fn reduce_authors(metadata: &mut Metadata, max_authors: usize) {
    let Some(Value::String(authors)) = metadata.get("authors") else {
        return;
    };

    let list: Vec<&str> = authors.split(',').map(str::trim).collect();
    let reduced = if list.len() > max_authors {
        format!("{}, et al.", list[..max_authors].join(", "))
    } else {
        list.join(", ")
    };
    metadata.insert("authors".into(), Value::String(reduced));
}

/// One node per record with a non-empty abstract
pub fn abstract_documents(records: &[AbstractRecord]) -> Vec<VectorDocument> {
    records
        .iter()
        .filter(|r| !r.abstract_text.trim().is_empty())
        .map(|r| VectorDocument {
            id: r.document_id.clone(),
            text: r.abstract_text.clone(),
            metadata: record_metadata(r),
        })
        .collect()
}

fn pico_label(letter: char) -> Option<&'static str> {
    match letter {
        'p' => Some("Patient"),
        'i' => Some("Intervention"),
        'c' => Some("Comparison"),
        'o' => Some("Outcome"),
        _ => None,
    }
}

fn pico_value(record: &AbstractRecord, letter: char) -> Option<&str> {
    let value = match letter {
        'p' => record.pico_p.as_deref(),
        'i' => record.pico_i.as_deref(),
        'c' => record.pico_c.as_deref(),
        'o' => record.pico_o.as_deref(),
        _ => None,
    };
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Labelled lines for the fields in `key`, `None` when all are empty
pub fn pico_text(record: &AbstractRecord, key: &str) -> Option<String> {
    let lines: Vec<String> = key
        .chars()
        .filter_map(|letter| {
            let label = pico_label(letter)?;
            let value = pico_value(record, letter)?;
            Some(format!("{}: {}", label, value))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Nodes for one PICO combination index
pub fn pico_documents(records: &[AbstractRecord], key: &str) -> Vec<VectorDocument> {
    records
        .iter()
        .filter_map(|r| {
            Some(VectorDocument {
                id: r.document_id.clone(),
                text: pico_text(r, key)?,
                metadata: record_metadata(r),
            })
        })
        .collect()
}

/// Writes nodes into vector tables
pub struct IndexBuilder {
    conn: DatabaseConnection,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    default_top_k: usize,
}

impl IndexBuilder {
    pub fn new(
        conn: DatabaseConnection,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        default_top_k: usize,
    ) -> Self {
        Self {
            conn,
            embedder,
            batch_size,
            default_top_k,
        }
    }

    async fn open(&self, table: &str) -> Result<VectorIndex> {
        Ok(VectorIndex::load(
            self.conn.clone(),
            table,
            self.embedder.clone(),
            self.default_top_k,
        )
        .await?)
    }

    async fn write(&self, table: &str, documents: &[VectorDocument]) -> Result<usize> {
        if documents.is_empty() {
            info!(table, "Nothing to index");
            return Ok(0);
        }
        let index = self.open(table).await?;
        Ok(index.insert_documents(documents, self.batch_size).await?)
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn build_abstract_index(&self, records: &[AbstractRecord], table: &str) -> Result<usize> {
        let documents = abstract_documents(records);
        let written = self.write(table, &documents).await?;
        info!(table, written, "Abstract index built");
        Ok(written)
    }

    /// Build `{base}_{key}` for every PICO combination
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn build_pico_indexes(
        &self,
        records: &[AbstractRecord],
        base: &str,
    ) -> Result<BTreeMap<String, usize>> {
        let mut written = BTreeMap::new();

        for key in pico_combinations() {
            let table = format!("{}_{}", base, key);
            let documents = pico_documents(records, &key);
            debug!(table = %table, documents = documents.len(), "PICO documents prepared");

            let count = self.write(&table, &documents).await?;
            written.insert(key, count);
        }

        info!(indexes = written.len(), "PICO indexes built");
        Ok(written)
    }

    #[instrument(skip(self, texts, chunking), fields(documents = texts.len()))]
    pub async fn build_fulltext_index(
        &self,
        texts: &[(String, String)],
        table: &str,
        chunking: &ChunkingConfig,
    ) -> Result<usize> {
        let documents: Vec<VectorDocument> = texts
            .iter()
            .flat_map(|(id, text)| chunk_document(id, text, chunking))
            .collect();

        let written = self.write(table, &documents).await?;
        info!(table, chunks = written, "Fulltext index built");
        Ok(written)
    }

    /// Delete nodes missing any of `required` metadata keys
    pub async fn prune(&self, table: &str, required: &[String]) -> Result<u64> {
        let index = self.open(table).await?;
        Ok(index.store().delete_missing_metadata(required).await?)
    }
}
