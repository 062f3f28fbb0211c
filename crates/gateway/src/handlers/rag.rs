//! Summarization, query expansion and document chat

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::search::validation_error;
use crate::AppState;
use litfunnel_common::{
    cache::summary_key,
    errors::Result,
    llm::{prompts::SUMMARY_PROMPT, EMPTY_RESPONSE},
    vector::{fusion::generate_queries, MetadataFilters, RetrievalOptions, Retriever},
};

/// Reply for an empty id list
pub const NO_DOCUMENTS: &str = "No documents to summarize.";

/// Abstracts retrieved for a summary
const SUMMARY_TOP_K: usize = 10;

/// Chunks retrieved for a document chat
const CHAT_TOP_K: usize = 10;

/// Alternatives produced by query expansion
const EXPANSIONS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub project_id: Option<i32>,
    #[serde(default, deserialize_with = "super::ids_as_strings")]
    pub document_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub cached: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExpandQueryRequest {
    #[validate(length(min = 1))]
    pub initial_query: String,
}

#[derive(Debug, Serialize)]
pub struct ExpandQueryResponse {
    pub alternatives: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1))]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub document_id: i64,
    pub question: String,
    pub response: String,
}

/// One short summary across the given documents' abstracts
pub async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>> {
    if request.document_ids.is_empty() {
        return Ok(Json(SummarizeResponse {
            summary: NO_DOCUMENTS.to_string(),
            cached: false,
        }));
    }

    let key = summary_key(&request.document_ids);
    if let Some(summary) = state.summary_cache.get(&key).await {
        debug!(key = %key, "Summary served from cache");
        return Ok(Json(SummarizeResponse {
            summary,
            cached: true,
        }));
    }

    let options = RetrievalOptions::top_k(SUMMARY_TOP_K)
        .with_filters(MetadataFilters::any_source(request.document_ids.iter().cloned()));
    let nodes = state.indexes.abstracts.retrieve(SUMMARY_PROMPT, &options).await?;

    let synthesized = state.synthesizer().synthesize(SUMMARY_PROMPT, nodes).await?;
    let summary = synthesized.response;

    state
        .operations()
        .create_rag_summary(request.project_id, &request.document_ids, &summary)
        .await?;
    state.summary_cache.insert(key, summary.clone()).await;

    info!(
        documents = request.document_ids.len(),
        sources = synthesized.source_nodes.len(),
        "Summary generated"
    );

    Ok(Json(SummarizeResponse {
        summary,
        cached: false,
    }))
}

/// Alternative phrasings of a search query
pub async fn expand_query(
    State(state): State<AppState>,
    Json(request): Json<ExpandQueryRequest>,
) -> Result<Json<ExpandQueryResponse>> {
    request.validate().map_err(validation_error)?;

    let queries = generate_queries(state.llm.as_ref(), &request.initial_query, EXPANSIONS + 1).await?;
    let alternatives: Vec<String> = queries.into_iter().skip(1).collect();

    state
        .operations()
        .create_rag_query(None, &request.initial_query, &alternatives)
        .await?;

    Ok(Json(ExpandQueryResponse { alternatives }))
}

/// Answer a question from one document's full text, or its abstract when
/// no full text is indexed
pub async fn chat_document(
    State(state): State<AppState>,
    Path((project_id, document_id)): Path<(i32, i64)>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate().map_err(validation_error)?;

    let options = RetrievalOptions::top_k(CHAT_TOP_K)
        .with_filters(MetadataFilters::any_source([document_id.to_string()]));

    let mut nodes = state.indexes.fulltext.retrieve(&request.question, &options).await?;
    if nodes.is_empty() {
        debug!(document_id, "No full text indexed, falling back to abstract");
        nodes = state.indexes.abstracts.retrieve(&request.question, &options).await?;
    }

    let synthesized = state.synthesizer().synthesize(&request.question, nodes).await?;
    let answer = (synthesized.response != EMPTY_RESPONSE).then_some(synthesized.response.as_str());

    state
        .operations()
        .create_rag_chat(project_id, document_id, &request.question, answer)
        .await?;

    Ok(Json(ChatResponse {
        document_id,
        question: request.question,
        response: synthesized.response,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{self, inserted, mock_db, vector_row};
    use async_trait::async_trait;
    use litfunnel_common::db::{models::RagSummary, Databases};
    use litfunnel_common::llm::LlmClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Both trials study aspirin in adults.".to_string())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_empty_ids_skip_retrieval() {
        let request = SummarizeRequest {
            project_id: Some(1),
            document_ids: vec![],
        };
        let Json(response) = summarize(State(test_support::state()), Json(request))
            .await
            .unwrap();
        assert_eq!(response.summary, NO_DOCUMENTS);
        assert!(!response.cached);
    }

    #[tokio::test]
    async fn test_cached_summary_is_returned() {
        let state = test_support::state();
        state
            .summary_cache
            .insert(summary_key(&["2".into(), "1".into()]), "cached summary".into())
            .await;

        let request: SummarizeRequest =
            serde_json::from_str(r#"{"project_id": 1, "document_ids": [1, 2]}"#).unwrap();
        let Json(response) = summarize(State(state), Json(request)).await.unwrap();
        assert_eq!(response.summary, "cached summary");
        assert!(response.cached);
    }

    #[test]
    fn test_empty_question_rejected() {
        let request = ChatRequest { question: String::new() };
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn test_second_summary_comes_from_cache() {
        let operations = mock_db()
            .append_exec_results([inserted(1)])
            .append_query_results([vec![RagSummary {
                id: 1,
                project_id: Some(1),
                document_ids: serde_json::json!(["1", "2"]),
                summary: "Both trials study aspirin in adults.".into(),
                created_at: chrono::Utc::now(),
            }]])
            .into_connection();
        let vectors = mock_db()
            .append_query_results([vec![
                vector_row("n1", "1", "Aspirin lowered mortality.", 0.2),
                vector_row("n2", "2", "Aspirin versus placebo in adults.", 0.3),
            ]])
            .into_connection();

        let llm = Arc::new(CountingLlm::default());
        let dbs = Databases {
            datastore: mock_db().into_connection(),
            operations,
            vectors,
        };
        let state = test_support::state_with(llm.clone(), dbs);

        let first: SummarizeRequest =
            serde_json::from_str(r#"{"project_id": 1, "document_ids": [1, 2]}"#).unwrap();
        let Json(response) = summarize(State(state.clone()), Json(first)).await.unwrap();
        assert_eq!(response.summary, "Both trials study aspirin in adults.");
        assert!(!response.cached);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let second: SummarizeRequest =
            serde_json::from_str(r#"{"project_id": 1, "document_ids": ["2", "1"]}"#).unwrap();
        let Json(response) = summarize(State(state), Json(second)).await.unwrap();
        assert_eq!(response.summary, "Both trials study aspirin in adults.");
        assert!(response.cached);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }
}
