//! Shared application state

use litfunnel_common::{
    cache::SummaryCache,
    config::AppConfig,
    db::{Databases, DatastoreRepository, OperationsRepository},
    embeddings::Embedder,
    llm::{LlmClient, Synthesizer},
    retry::RetryPolicy,
    vector::IndexRegistry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dbs: Databases,
    pub indexes: Arc<IndexRegistry>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn Embedder>,
    pub summary_cache: Arc<SummaryCache>,
    pub retry: RetryPolicy,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn operations(&self) -> OperationsRepository {
        OperationsRepository::new(self.dbs.operations.clone())
    }

    pub fn datastore(&self) -> DatastoreRepository {
        DatastoreRepository::new(self.dbs.datastore.clone())
    }

    pub fn synthesizer(&self) -> Synthesizer {
        let synthesizer = Synthesizer::new(self.llm.clone(), self.config.llm.max_context_chars);
        match self.config.llm.synthesis_cutoff {
            Some(cutoff) => synthesizer.with_similarity_cutoff(cutoff),
            None => synthesizer,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use litfunnel_common::embeddings::MockEmbedder;
    use litfunnel_common::llm::MockLlm;
    use litfunnel_common::vector::{VectorIndex, VectorStore};
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Value};
    use std::collections::{BTreeMap, HashMap};

    fn index(conn: &DatabaseConnection, table: &str, embedder: Arc<dyn Embedder>) -> VectorIndex {
        let store = VectorStore::new(conn.clone(), table, 8).unwrap();
        VectorIndex::new(store, embedder, 10)
    }

    pub fn disconnected() -> Databases {
        Databases {
            datastore: DatabaseConnection::Disconnected,
            operations: DatabaseConnection::Disconnected,
            vectors: DatabaseConnection::Disconnected,
        }
    }

    pub fn mock_db() -> MockDatabase {
        MockDatabase::new(DatabaseBackend::MySql)
    }

    /// Exec result of a single-row insert
    pub fn inserted(id: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: id,
            rows_affected: 1,
        }
    }

    /// Row as returned by a vector table query
    pub fn vector_row(id: &str, source: &str, text: &str, distance: f64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("id", Value::from(id)),
            ("document", Value::from(text)),
            ("meta", Value::from(serde_json::json!({ "source": source }).to_string())),
            ("distance", Value::from(distance)),
        ])
    }

    /// State over the given databases with mock models
    pub fn state_with(llm: Arc<dyn LlmClient>, dbs: Databases) -> AppState {
        let config = AppConfig::default();
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(8));
        let indexes = IndexRegistry::from_parts(
            index(&dbs.vectors, "test_abstracts", embedder.clone()),
            index(&dbs.vectors, "test_abstracts_fulltext", embedder.clone()),
            HashMap::new(),
        );

        AppState {
            summary_cache: Arc::new(SummaryCache::from_config(&config.summary_cache)),
            retry: RetryPolicy::from(&config.retry),
            config: Arc::new(config),
            dbs,
            indexes: Arc::new(indexes),
            llm,
            embedder,
            prometheus: None,
        }
    }

    /// State with disconnected databases and mock models
    pub fn state_with_llm(llm: Arc<dyn LlmClient>) -> AppState {
        state_with(llm, disconnected())
    }

    pub fn state() -> AppState {
        state_with_llm(Arc::new(MockLlm::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litfunnel_common::llm::{MockLlm, EMPTY_RESPONSE};
    use litfunnel_common::vector::{Metadata, ScoredNode};

    fn node(score: f64) -> ScoredNode {
        ScoredNode {
            id: "n1".into(),
            text: "Aspirin lowered mortality.".into(),
            metadata: Metadata::new(),
            score,
        }
    }

    #[tokio::test]
    async fn test_synthesizer_applies_configured_cutoff() {
        let mut state = test_support::state_with_llm(Arc::new(MockLlm::with_response("answer")));
        let out = state.synthesizer().synthesize("q", vec![node(0.4)]).await.unwrap();
        assert_eq!(out.response, "answer");

        let mut config = AppConfig::default();
        config.llm.synthesis_cutoff = Some(0.5);
        state.config = Arc::new(config);

        let out = state.synthesizer().synthesize("q", vec![node(0.4)]).await.unwrap();
        assert_eq!(out.response, EMPTY_RESPONSE);
    }
}
