//! Search handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use validator::Validate;

use crate::AppState;
use litfunnel_common::{
    db::models::SearchResult,
    errors::{AppError, Result},
    metrics,
    retry::{retry_fixed, retry_transient},
    vector::{
        filter_by_similarity, FilterCondition, FusionMode, MetadataFilter, MetadataFilters,
        QueryFusion, RetrievalOptions, Retriever, ScoredNode,
    },
};

/// Top-k for each fused sub-query
const FUSION_TOP_K: usize = 100;

/// Hits returned by simple search; every hit is still stored
const SIMPLE_RESULTS_SHOWN: usize = 5;

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 255))]
    pub query_text: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvancedSearchParams {
    #[serde(default = "default_num_gen_queries")]
    pub num_gen_queries: usize,
}

fn default_num_gen_queries() -> usize { 3 }

/// Semantic search request
#[derive(Debug, Deserialize, Validate)]
pub struct SemanticSearchRequest {
    #[validate(length(min = 1, max = 255))]
    pub query_text: String,

    /// Fields to search: "All Fields", "Full Document" or PICO field names
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Restrict to these documents
    #[serde(default, deserialize_with = "super::ids_as_strings")]
    pub source_ids: Vec<String>,
}

fn default_fields() -> Vec<String> { vec!["All Fields".to_string()] }

/// Search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub query_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_queries: Option<Vec<String>>,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct SemanticSearchResponse {
    pub query: String,
    pub results: Vec<i64>,
}

pub(crate) fn validation_error(errors: validator::ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|k| k.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

/// Retrieve from the abstract index and store the hits as a new query.
/// Only the top hits are returned.
pub async fn simple_search(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    request.validate().map_err(validation_error)?;
    let start = Instant::now();

    let mut response = retry_transient("simple_search", || {
        run_search(&state, project_id, &request.query_text, None)
    })
    .await?;

    metrics::record_search(start.elapsed().as_secs_f64(), "simple", response.results.len());
    response.results.truncate(SIMPLE_RESULTS_SHOWN);
    Ok(Json(response))
}

/// Query fusion over `num_gen_queries` generated variants plus the original
pub async fn advanced_search(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    Query(params): Query<AdvancedSearchParams>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    request.validate().map_err(validation_error)?;
    let start = Instant::now();

    let fusion = QueryFusion::new(
        params.num_gen_queries + 1,
        FUSION_TOP_K,
        FusionMode::ReciprocalRank,
    );

    let response = retry_fixed(state.retry, "advanced_search", || {
        run_search(&state, project_id, &request.query_text, Some(&fusion))
    })
    .await?;

    metrics::record_search(start.elapsed().as_secs_f64(), "advanced", response.results.len());
    Ok(Json(response))
}

async fn run_search(
    state: &AppState,
    project_id: i32,
    query_text: &str,
    fusion: Option<&QueryFusion>,
) -> Result<SearchResponse> {
    let operations = state.operations();
    let query = operations.create_query(project_id, query_text).await?;

    let index = state.indexes.abstracts.as_ref();
    let (nodes, generated_queries) = match fusion {
        Some(fusion) => {
            let fused = fusion.retrieve(index, state.llm.as_ref(), query_text).await?;
            let generated = fused.generated_queries().to_vec();
            (fused.nodes, Some(generated))
        }
        None => (index.retrieve(query_text, &RetrievalOptions::default()).await?, None),
    };

    let pdf_ids = state.datastore().full_text_document_ids().await?;
    let results = operations.create_results(query.id, &nodes, &pdf_ids).await?;

    info!(
        project_id,
        query_id = query.id,
        results = results.len(),
        "Search completed"
    );

    Ok(SearchResponse {
        query: query.query_text,
        query_id: query.id,
        generated_queries,
        results,
    })
}

/// Field-routed search returning matching source ids only
pub async fn semantic_search(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    Json(request): Json<SemanticSearchRequest>,
) -> Result<Json<SemanticSearchResponse>> {
    request.validate().map_err(validation_error)?;
    let start = Instant::now();

    let operations = state.operations();
    let semantic_query = operations
        .create_semantic_query(project_id, &request.query_text, &request.fields, &request.source_ids)
        .await?;

    let index = state.indexes.index_for_fields(&request.fields);
    let options = RetrievalOptions::default().with_filters(source_filter(&request.source_ids));
    let nodes = index.retrieve(&request.query_text, &options).await?;

    let cutoff = f64::from(state.config.vector.similarity_cutoff);
    let source_ids = node_source_ids(&filter_by_similarity(nodes, cutoff));

    operations
        .create_semantic_result(semantic_query.id, &source_ids)
        .await?;

    info!(
        project_id,
        index = %index.table(),
        results = source_ids.len(),
        "Semantic search completed"
    );
    metrics::record_search(start.elapsed().as_secs_f64(), "semantic", source_ids.len());

    Ok(Json(SemanticSearchResponse {
        query: semantic_query.query_text,
        results: source_ids,
    }))
}

/// `source IN ids`, empty when no ids are given
fn source_filter(source_ids: &[String]) -> MetadataFilters {
    if source_ids.is_empty() {
        return MetadataFilters::default();
    }
    MetadataFilters::new(
        vec![MetadataFilter::one_of("source", source_ids.iter().cloned())],
        FilterCondition::And,
    )
}

/// Integer sources in node order; non-numeric sources are skipped
fn node_source_ids(nodes: &[ScoredNode]) -> Vec<i64> {
    nodes
        .iter()
        .filter_map(|n| n.source())
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{self, inserted, mock_db, vector_row};
    use litfunnel_common::db::models::{DocumentFull, Query, SemanticQuery, SemanticResult};
    use litfunnel_common::db::Databases;
    use litfunnel_common::llm::MockLlm;
    use litfunnel_common::vector::Metadata;
    use sea_orm::MockExecResult;
    use std::sync::Arc;

    fn stored_result(id: i32, source_id: i64) -> SearchResult {
        SearchResult {
            id,
            query_id: 1,
            source_id,
            similarity: 0.8,
            authors: None,
            year: None,
            title: None,
            abstract_text: None,
            pico_p: None,
            pico_i: None,
            pico_c: None,
            pico_o: None,
            funnel_stage: "Identified".into(),
            is_archived: false,
            has_pdf: false,
        }
    }

    fn node(source: serde_json::Value) -> ScoredNode {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), source);
        ScoredNode {
            id: "n".into(),
            text: String::new(),
            metadata,
            score: 0.9,
        }
    }

    #[test]
    fn test_query_text_length() {
        assert!(SearchRequest { query_text: String::new() }.validate().is_err());
        assert!(SearchRequest { query_text: "a".repeat(256) }.validate().is_err());
        assert!(SearchRequest { query_text: "aspirin".into() }.validate().is_ok());
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = SearchRequest { query_text: String::new() }.validate().unwrap_err();
        match validation_error(err) {
            AppError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("query_text")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_semantic_request_defaults() {
        let request: SemanticSearchRequest =
            serde_json::from_str(r#"{"query_text": "stroke"}"#).unwrap();
        assert_eq!(request.fields, vec!["All Fields"]);
        assert!(request.source_ids.is_empty());

        let request: SemanticSearchRequest =
            serde_json::from_str(r#"{"query_text": "stroke", "source_ids": [101, "102"]}"#).unwrap();
        assert_eq!(request.source_ids, vec!["101", "102"]);
    }

    #[test]
    fn test_advanced_params_default() {
        let params: AdvancedSearchParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.num_gen_queries, 3);
    }

    #[test]
    fn test_source_filter() {
        assert!(source_filter(&[]).is_empty());
        let filters = source_filter(&["1".into(), "2".into()]);
        assert_eq!(filters.filters.len(), 1);
    }

    #[test]
    fn test_node_source_ids_skip_non_numeric() {
        let nodes = vec![
            node(serde_json::json!("16625675")),
            node(serde_json::json!("not-a-pmid")),
            node(serde_json::json!(42)),
        ];
        assert_eq!(node_source_ids(&nodes), vec![16625675, 42]);
    }

    #[tokio::test]
    async fn test_semantic_search_applies_similarity_cutoff() {
        let operations = mock_db()
            .append_exec_results([inserted(3), inserted(9)])
            .append_query_results([vec![SemanticQuery {
                id: 3,
                project_id: 1,
                query_text: "stroke prevention".into(),
                fields: Some(serde_json::json!(["All Fields"])),
                source_ids: Some(serde_json::json!([])),
            }]])
            .append_query_results([vec![SemanticResult {
                id: 9,
                semantic_query_id: 3,
                source_ids: serde_json::json!([101]),
            }]])
            .into_connection();
        let vectors = mock_db()
            .append_query_results([vec![
                vector_row("n1", "101", "Aspirin prevented stroke.", 0.1),
                vector_row("n2", "102", "Unrelated cohort.", 0.7),
            ]])
            .into_connection();

        let dbs = Databases {
            datastore: mock_db().into_connection(),
            operations,
            vectors,
        };
        let state = test_support::state_with(Arc::new(MockLlm::new()), dbs);
        assert!((state.config.vector.similarity_cutoff - 0.5).abs() < f32::EPSILON);

        let request: SemanticSearchRequest =
            serde_json::from_str(r#"{"query_text": "stroke prevention"}"#).unwrap();
        let Json(response) = semantic_search(State(state), Path(1), Json(request)).await.unwrap();

        assert_eq!(response.query, "stroke prevention");
        assert_eq!(response.results, vec![101]);
    }

    #[tokio::test]
    async fn test_simple_search_returns_top_five() {
        let stored: Vec<SearchResult> = (1..=7).map(|i| stored_result(i, 100 + i64::from(i))).collect();
        let operations = mock_db()
            .append_exec_results([
                inserted(1),
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 7,
                },
            ])
            .append_query_results([vec![Query {
                id: 1,
                project_id: 1,
                query_text: "aspirin".into(),
            }]])
            .append_query_results([stored])
            .into_connection();
        let vectors = mock_db()
            .append_query_results([(1..=7)
                .map(|i| vector_row(&format!("n{i}"), &format!("{}", 100 + i), "Aspirin trial.", 0.1))
                .collect::<Vec<_>>()])
            .into_connection();
        let datastore = mock_db()
            .append_query_results([Vec::<DocumentFull>::new()])
            .into_connection();

        let dbs = Databases {
            datastore,
            operations,
            vectors,
        };
        let state = test_support::state_with(Arc::new(MockLlm::new()), dbs);

        let request = SearchRequest {
            query_text: "aspirin".into(),
        };
        let Json(response) = simple_search(State(state), Path(1), Json(request)).await.unwrap();

        assert_eq!(response.query_id, 1);
        assert_eq!(response.results.len(), SIMPLE_RESULTS_SHOWN);
        assert_eq!(response.results[0].source_id, 101);
    }
}
