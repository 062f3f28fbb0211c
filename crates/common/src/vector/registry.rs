//! All vector indexes the API serves, loaded once at startup

use super::{pico_combinations, VectorIndex};
use crate::config::VectorConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Which index a field selection resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRoute {
    Abstracts,
    FullText,
    Pico(String),
}

/// Resolve requested search fields to an index.
///
/// "Full Document" wins over everything, then "All Fields" (or no fields).
/// Otherwise the PICO field names are combined into a key ordered as
/// `pico`; unknown names are ignored.
pub fn route_fields(fields: &[String]) -> IndexRoute {
    let has = |name: &str| fields.iter().any(|f| f.trim().eq_ignore_ascii_case(name));

    if has("Full Document") {
        return IndexRoute::FullText;
    }
    if fields.is_empty() || has("All Fields") {
        return IndexRoute::Abstracts;
    }

    let mut letters = [false; 4];
    for field in fields {
        let slot = match field.trim().to_ascii_lowercase().as_str() {
            "patient" | "population" | "participants" | "p" => Some(0),
            "intervention" | "i" => Some(1),
            "comparison" | "comparator" | "c" => Some(2),
            "outcome" | "outcomes" | "o" => Some(3),
            _ => None,
        };
        if let Some(slot) = slot {
            letters[slot] = true;
        }
    }

    let key: String = ['p', 'i', 'c', 'o']
        .iter()
        .zip(letters)
        .filter_map(|(letter, set)| set.then_some(*letter))
        .collect();

    if key.is_empty() {
        IndexRoute::Abstracts
    } else {
        IndexRoute::Pico(key)
    }
}

enum Slot {
    Abstracts,
    FullText,
    Pico(String),
}

pub struct IndexRegistry {
    pub abstracts: Arc<VectorIndex>,
    pub fulltext: Arc<VectorIndex>,
    pub pico: HashMap<String, Arc<VectorIndex>>,
}

impl IndexRegistry {
    pub fn from_parts(
        abstracts: VectorIndex,
        fulltext: VectorIndex,
        pico: HashMap<String, VectorIndex>,
    ) -> Self {
        Self {
            abstracts: Arc::new(abstracts),
            fulltext: Arc::new(fulltext),
            pico: pico.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        }
    }

    /// Load the abstract, full-text and all 15 PICO indexes concurrently.
    /// Returns once every load has finished; any failure fails the whole load.
    pub async fn load(
        conn: DatabaseConnection,
        embedder: Arc<dyn Embedder>,
        config: &VectorConfig,
    ) -> Result<Self> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        let mut targets = vec![
            (Slot::Abstracts, config.base_table.clone()),
            (Slot::FullText, format!("{}_fulltext", config.base_table)),
        ];
        for key in pico_combinations() {
            let table = format!("{}_{}", config.base_table, key);
            targets.push((Slot::Pico(key), table));
        }

        for (slot, table) in targets {
            let conn = conn.clone();
            let embedder = embedder.clone();
            let top_k = config.default_top_k;
            tasks.spawn(async move {
                let index = VectorIndex::load(conn, &table, embedder, top_k).await?;
                Ok::<_, AppError>((slot, index))
            });
        }

        let mut abstracts = None;
        let mut fulltext = None;
        let mut pico = HashMap::new();

        while let Some(joined) = tasks.join_next().await {
            let (slot, index) = joined.map_err(|e| AppError::Internal {
                message: format!("Index load task failed: {}", e),
            })??;

            debug!(table = %index.table(), "Index ready");
            match slot {
                Slot::Abstracts => abstracts = Some(index),
                Slot::FullText => fulltext = Some(index),
                Slot::Pico(key) => {
                    pico.insert(key, index);
                }
            }
        }

        let (Some(abstracts), Some(fulltext)) = (abstracts, fulltext) else {
            return Err(AppError::VectorStore {
                message: "Abstract or full-text index missing after load".to_string(),
            });
        };

        info!(
            indexes = 2 + pico.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "All vector indexes loaded"
        );

        Ok(Self::from_parts(abstracts, fulltext, pico))
    }

    /// Index to search for the requested fields, falling back to abstracts
    pub fn index_for_fields(&self, fields: &[String]) -> Arc<VectorIndex> {
        match route_fields(fields) {
            IndexRoute::FullText => self.fulltext.clone(),
            IndexRoute::Abstracts => self.abstracts.clone(),
            IndexRoute::Pico(key) => match self.pico.get(&key) {
                Some(index) => index.clone(),
                None => {
                    debug!(key = %key, "No PICO index for key, using abstracts");
                    self.abstracts.clone()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::vector::VectorStore;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn index(table: &str) -> VectorIndex {
        let store = VectorStore::new(DatabaseConnection::Disconnected, table, 8).unwrap();
        VectorIndex::new(store, Arc::new(MockEmbedder::new(8)), 100)
    }

    #[test]
    fn test_route_special_fields() {
        assert_eq!(route_fields(&[]), IndexRoute::Abstracts);
        assert_eq!(route_fields(&fields(&["All Fields"])), IndexRoute::Abstracts);
        assert_eq!(
            route_fields(&fields(&["Patient", "Full Document"])),
            IndexRoute::FullText
        );
        assert_eq!(
            route_fields(&fields(&["Outcome", "All Fields"])),
            IndexRoute::Abstracts
        );
    }

    #[test]
    fn test_route_combines_pico_fields_in_order() {
        assert_eq!(route_fields(&fields(&["Patient"])), IndexRoute::Pico("p".into()));
        assert_eq!(
            route_fields(&fields(&["Outcome", "Patient"])),
            IndexRoute::Pico("po".into())
        );
        assert_eq!(
            route_fields(&fields(&["Comparison", "Intervention", "Outcome", "Patient"])),
            IndexRoute::Pico("pico".into())
        );
        assert_eq!(
            route_fields(&fields(&["Intervention", "Intervention"])),
            IndexRoute::Pico("i".into())
        );
    }

    #[test]
    fn test_route_unknown_fields_fall_back() {
        assert_eq!(route_fields(&fields(&["Title"])), IndexRoute::Abstracts);
        assert_eq!(
            route_fields(&fields(&["Title", "Outcome"])),
            IndexRoute::Pico("o".into())
        );
    }

    #[test]
    fn test_index_for_fields() {
        let mut pico = HashMap::new();
        pico.insert("po".to_string(), index("base_po"));
        let registry = IndexRegistry::from_parts(index("base"), index("base_fulltext"), pico);

        assert_eq!(registry.index_for_fields(&fields(&["Patient", "Outcome"])).table(), "base_po");
        assert_eq!(registry.index_for_fields(&fields(&["Full Document"])).table(), "base_fulltext");
        // key without a loaded index
        assert_eq!(registry.index_for_fields(&fields(&["Comparison"])).table(), "base");
        assert_eq!(registry.index_for_fields(&[]).table(), "base");
    }
}
