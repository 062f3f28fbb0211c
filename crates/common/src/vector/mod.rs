//! Vector indexes over TiDB vector tables
//!
//! One table per index: the abstract index, the full-text chunk index and
//! one index per PICO field combination. Each table stores the node text,
//! its JSON metadata and a cosine-searchable embedding.

mod filters;
pub mod fusion;
mod index;
mod registry;
mod store;

pub use filters::{FilterCondition, FilterOperator, FilterValue, MetadataFilter, MetadataFilters};
pub use fusion::{FusedRetrieval, FusionMode, QueryFusion};
pub use index::{RetrievalOptions, VectorIndex};
pub use registry::{route_fields, IndexRegistry, IndexRoute};
pub use store::{validate_table_name, VectorStore};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata attached to every node
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Node to be embedded and stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Retrieved node with its similarity score (`1 - cosine distance`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f64,
}

impl ScoredNode {
    /// Document id this node came from
    pub fn source(&self) -> Option<String> {
        match self.metadata.get("source")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Anything that turns a query string into scored nodes
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<ScoredNode>>;
}

/// Keep nodes scoring at or above `cutoff`
pub fn filter_by_similarity(nodes: Vec<ScoredNode>, cutoff: f64) -> Vec<ScoredNode> {
    nodes.into_iter().filter(|n| n.score >= cutoff).collect()
}

/// PICO field letters in canonical order
pub const PICO_LETTERS: [char; 4] = ['p', 'i', 'c', 'o'];

/// Every non-empty ordered combination of `p, i, c, o`, shortest first:
/// `p, i, c, o, pi, pc, po, ic, io, co, pic, pio, pco, ico, pico`
pub fn pico_combinations() -> Vec<String> {
    let mut combos = Vec::with_capacity(15);
    for size in 1..=PICO_LETTERS.len() {
        collect_combinations(&PICO_LETTERS, size, 0, &mut String::new(), &mut combos);
    }
    combos
}

fn collect_combinations(
    letters: &[char],
    size: usize,
    start: usize,
    current: &mut String,
    out: &mut Vec<String>,
) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }
    for idx in start..letters.len() {
        current.push(letters[idx]);
        collect_combinations(letters, size, idx + 1, current, out);
        current.pop();
    }
}

/// Metadata key holding the PICO text for a letter
pub fn pico_field_key(letter: char) -> Option<&'static str> {
    match letter {
        'p' => Some("pico_p"),
        'i' => Some("pico_i"),
        'c' => Some("pico_c"),
        'o' => Some("pico_o"),
        _ => None,
    }
}

/// Render an embedding as a TiDB vector literal, e.g. `[0.1,0.2]`
pub fn format_embedding(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(score: f64, source: serde_json::Value) -> ScoredNode {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), source);
        ScoredNode {
            id: "n".into(),
            text: "t".into(),
            metadata,
            score,
        }
    }

    #[test]
    fn test_pico_combinations_order_and_count() {
        let combos = pico_combinations();
        assert_eq!(
            combos,
            vec![
                "p", "i", "c", "o", "pi", "pc", "po", "ic", "io", "co", "pic", "pio", "pco",
                "ico", "pico"
            ]
        );
    }

    #[test]
    fn test_filter_by_similarity_is_inclusive() {
        let nodes = vec![
            node(0.49, json!("1")),
            node(0.5, json!("2")),
            node(0.9, json!("3")),
        ];
        let kept = filter_by_similarity(nodes, 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source().as_deref(), Some("2"));
    }

    #[test]
    fn test_source_accepts_numbers() {
        assert_eq!(node(1.0, json!(16625675)).source().as_deref(), Some("16625675"));
        assert_eq!(node(1.0, json!(null)).source(), None);
    }

    #[test]
    fn test_embedding_format() {
        assert_eq!(format_embedding(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
    }
}
