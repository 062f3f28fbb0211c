//! Vector index: a store paired with the embedder that fills it

use super::{MetadataFilters, Retriever, ScoredNode, VectorDocument, VectorStore};
use crate::embeddings::Embedder;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Per-call retrieval settings
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    /// `None` falls back to the index default
    pub similarity_top_k: Option<usize>,
    pub filters: Option<MetadataFilters>,
}

impl RetrievalOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            similarity_top_k: Some(top_k),
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = if filters.is_empty() { None } else { Some(filters) };
        self
    }
}

pub struct VectorIndex {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    default_top_k: usize,
}

impl VectorIndex {
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>, default_top_k: usize) -> Self {
        Self {
            store,
            embedder,
            default_top_k,
        }
    }

    /// Open the index, creating its table when missing
    pub async fn load(
        conn: DatabaseConnection,
        table: &str,
        embedder: Arc<dyn Embedder>,
        default_top_k: usize,
    ) -> Result<Self> {
        let start = Instant::now();

        let store = VectorStore::new(conn, table, embedder.dimension())?;
        store.ensure_table().await?;

        let elapsed = start.elapsed();
        metrics::histogram!(crate::metrics::names::INDEX_LOAD, "table" => table.to_string())
            .record(elapsed.as_secs_f64());
        info!(table, elapsed_ms = elapsed.as_millis() as u64, "Vector index loaded");

        Ok(Self::new(store, embedder, default_top_k))
    }

    pub fn table(&self) -> &str {
        self.store.table()
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Embed and store documents, `batch_size` at a time
    #[instrument(skip(self, documents), fields(table = %self.table(), count = documents.len()))]
    pub async fn insert_documents(&self, documents: &[VectorDocument], batch_size: usize) -> Result<usize> {
        let mut written = 0;

        for batch in documents.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            written += self.store.add(batch, &embeddings).await?;
            debug!(written, "Batch indexed");
        }

        Ok(written)
    }
}

#[async_trait]
impl Retriever for VectorIndex {
    async fn retrieve(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<ScoredNode>> {
        let top_k = options.similarity_top_k.unwrap_or(self.default_top_k);
        let embedding = self.embedder.embed(query).await?;

        let nodes = self
            .store
            .query(&embedding, top_k, options.filters.as_ref())
            .await?;

        debug!(table = %self.table(), top_k, returned = nodes.len(), "Retrieved nodes");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::MetadataFilter;

    #[test]
    fn test_empty_filters_are_dropped() {
        let opts = RetrievalOptions::top_k(10).with_filters(MetadataFilters::default());
        assert!(opts.filters.is_none());
        assert_eq!(opts.similarity_top_k, Some(10));

        let opts = RetrievalOptions::default().with_filters(MetadataFilters::new(
            vec![MetadataFilter::eq("source", "1")],
            Default::default(),
        ));
        assert!(opts.filters.is_some());
        assert_eq!(opts.similarity_top_k, None);
    }
}
