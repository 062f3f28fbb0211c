//! Text chunking module
//!
//! Splits full texts into chunks for the fulltext index.

use litfunnel_common::vector::VectorDocument;
use serde_json::{Map, Value};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Chunks shorter than this are dropped
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            min_chunk_size: 20,
        }
    }
}

/// A text chunk with its position in the document
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub index: usize,
}

/// Split text into chunks for embedding
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size));

    let chunks: Vec<TextChunk> = splitter
        .chunks(text)
        .map(str::trim)
        .filter(|c| c.chars().count() >= config.min_chunk_size)
        .enumerate()
        .map(|(index, content)| TextChunk {
            content: content.to_string(),
            index,
        })
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    chunks
}

/// Vector documents for one full text, ids `{document_id}-{n}`
pub fn chunk_document(document_id: &str, text: &str, config: &ChunkingConfig) -> Vec<VectorDocument> {
    chunk_text(text, config)
        .into_iter()
        .map(|chunk| {
            let mut metadata = Map::new();
            metadata.insert("source".into(), Value::String(document_id.to_string()));
            VectorDocument {
                id: format!("{}-{}", document_id, chunk.index),
                text: chunk.content,
                metadata,
            }
        })
        .collect()
}
