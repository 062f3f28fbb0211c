//! Search history and review funnel access

use crate::db::models::*;
use crate::errors::Result;
use crate::vector::ScoredNode;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument, warn};

/// Archived/active split for one funnel stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelCount {
    pub archived: i64,
    pub active: i64,
}

/// Result row built from a retrieved node
#[derive(Debug, Clone, PartialEq)]
pub struct NewResult {
    pub source_id: i64,
    pub similarity: f64,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub pico_p: Option<String>,
    pub pico_i: Option<String>,
    pub pico_c: Option<String>,
    pub pico_o: Option<String>,
}

impl NewResult {
    /// Read bibliographic metadata from a node. Nodes whose `source`
    /// is not numeric yield `None`.
    pub fn from_node(node: &ScoredNode) -> Option<Self> {
        let source_id = node.source()?.trim().parse::<i64>().ok()?;

        Some(Self {
            source_id,
            similarity: node.score,
            authors: meta_string(node, "authors"),
            year: meta_year(node),
            title: meta_string(node, "title"),
            abstract_text: Some(node.text.clone()),
            pico_p: meta_string(node, "pico_p"),
            pico_i: meta_string(node, "pico_i"),
            pico_c: meta_string(node, "pico_c"),
            pico_o: meta_string(node, "pico_o"),
        })
    }
}

fn meta_string(node: &ScoredNode, key: &str) -> Option<String> {
    match node.metadata.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Null | serde_json::Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn meta_year(node: &ScoredNode) -> Option<i32> {
    match node.metadata.get("year")? {
        serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Zero-fill grouped `(stage, archived, count)` rows into one entry per stage.
/// Rows with an unrecognised stored stage are logged and left out.
pub fn fold_funnel_counts(rows: Vec<(String, bool, i64)>) -> BTreeMap<String, FunnelCount> {
    let mut counts: BTreeMap<String, FunnelCount> = FunnelStage::ALL
        .iter()
        .map(|stage| (stage.as_str().to_string(), FunnelCount::default()))
        .collect();

    for (stage, archived, count) in rows {
        let Ok(parsed) = stage.parse::<FunnelStage>() else {
            warn!(stage = %stage, count, "Skipping results with unknown funnel stage");
            continue;
        };
        let entry = counts.entry(parsed.as_str().to_string()).or_default();
        if archived {
            entry.archived += count;
        } else {
            entry.active += count;
        }
    }

    counts
}

/// Repository for the operations database
#[derive(Clone)]
pub struct OperationsRepository {
    conn: DatabaseConnection,
}

impl OperationsRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Queries & results
    // ========================================================================

    pub async fn create_query(&self, project_id: i32, query_text: &str) -> Result<Query> {
        let query = QueryActiveModel {
            project_id: Set(project_id),
            query_text: Set(query_text.to_string()),
            ..Default::default()
        };

        query.insert(&self.conn).await.map_err(Into::into)
    }

    /// Store retrieved nodes as `Identified` results of a query
    #[instrument(skip(self, nodes, pdf_ids), fields(nodes = nodes.len()))]
    pub async fn create_results(
        &self,
        query_id: i32,
        nodes: &[ScoredNode],
        pdf_ids: &HashSet<String>,
    ) -> Result<Vec<SearchResult>> {
        let rows: Vec<SearchResultActiveModel> = nodes
            .iter()
            .filter_map(NewResult::from_node)
            .map(|r| SearchResultActiveModel {
                query_id: Set(query_id),
                source_id: Set(r.source_id),
                similarity: Set(r.similarity),
                authors: Set(r.authors),
                year: Set(r.year),
                title: Set(r.title),
                abstract_text: Set(r.abstract_text),
                pico_p: Set(r.pico_p),
                pico_i: Set(r.pico_i),
                pico_c: Set(r.pico_c),
                pico_o: Set(r.pico_o),
                funnel_stage: Set(FunnelStage::Identified.into()),
                is_archived: Set(false),
                has_pdf: Set(pdf_ids.contains(&r.source_id.to_string())),
                ..Default::default()
            })
            .collect();

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let count = rows.len();
        SearchResultEntity::insert_many(rows)
            .exec_without_returning(&self.conn)
            .await?;

        info!(query_id, count, "Search results stored");

        SearchResultEntity::find()
            .filter(SearchResultColumn::QueryId.eq(query_id))
            .order_by_asc(SearchResultColumn::Id)
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn create_semantic_query(
        &self,
        project_id: i32,
        query_text: &str,
        fields: &[String],
        source_ids: &[String],
    ) -> Result<SemanticQuery> {
        let row = SemanticQueryActiveModel {
            project_id: Set(project_id),
            query_text: Set(query_text.to_string()),
            fields: Set(Some(serde_json::json!(fields))),
            source_ids: Set(Some(serde_json::json!(source_ids))),
            ..Default::default()
        };

        row.insert(&self.conn).await.map_err(Into::into)
    }

    pub async fn create_semantic_result(
        &self,
        semantic_query_id: i32,
        source_ids: &[i64],
    ) -> Result<SemanticResult> {
        let row = SemanticResultActiveModel {
            semantic_query_id: Set(semantic_query_id),
            source_ids: Set(serde_json::json!(source_ids)),
            ..Default::default()
        };

        row.insert(&self.conn).await.map_err(Into::into)
    }

    // ========================================================================
    // Funnel
    // ========================================================================

    pub async fn results_by_stage(
        &self,
        project_id: i32,
        stage: FunnelStage,
        include_archived: bool,
    ) -> Result<Vec<SearchResult>> {
        let mut select = SearchResultEntity::find()
            .inner_join(QueryEntity)
            .filter(QueryColumn::ProjectId.eq(project_id))
            .filter(SearchResultColumn::FunnelStage.eq(stage.as_str()));

        if !include_archived {
            select = select.filter(SearchResultColumn::IsArchived.eq(false));
        }

        select
            .order_by_asc(SearchResultColumn::Id)
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    /// Per-stage archived/active counts for a project
    pub async fn funnel_counts(&self, project_id: i32) -> Result<BTreeMap<String, FunnelCount>> {
        let rows: Vec<(String, bool, i64)> = SearchResultEntity::find()
            .select_only()
            .column(SearchResultColumn::FunnelStage)
            .column(SearchResultColumn::IsArchived)
            .column_as(SearchResultColumn::Id.count(), "count")
            .inner_join(QueryEntity)
            .filter(QueryColumn::ProjectId.eq(project_id))
            .group_by(SearchResultColumn::FunnelStage)
            .group_by(SearchResultColumn::IsArchived)
            .into_tuple()
            .all(&self.conn)
            .await?;

        Ok(fold_funnel_counts(rows))
    }

    /// Move every project result for the given sources to `stage`.
    /// Returns the updated rows.
    #[instrument(skip(self, source_ids), fields(count = source_ids.len()))]
    pub async fn update_stage(
        &self,
        project_id: i32,
        source_ids: &[i64],
        stage: FunnelStage,
    ) -> Result<Vec<SearchResult>> {
        let ids = self.project_result_ids(project_id, source_ids).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        SearchResultEntity::update_many()
            .col_expr(SearchResultColumn::FunnelStage, Expr::value(stage.as_str()))
            .filter(SearchResultColumn::Id.is_in(ids.clone()))
            .exec(&self.conn)
            .await?;

        metrics::counter!(
            crate::metrics::names::FUNNEL_UPDATES,
            "stage" => stage.as_str()
        )
        .increment(ids.len() as u64);

        SearchResultEntity::find()
            .filter(SearchResultColumn::Id.is_in(ids))
            .order_by_asc(SearchResultColumn::Id)
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    /// Set the archived flag on a source's results. Returns matched rows.
    pub async fn set_archived(&self, project_id: i32, source_id: i64, archived: bool) -> Result<u64> {
        let ids = self.project_result_ids(project_id, &[source_id]).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        SearchResultEntity::update_many()
            .col_expr(SearchResultColumn::IsArchived, Expr::value(archived))
            .filter(SearchResultColumn::Id.is_in(ids.clone()))
            .exec(&self.conn)
            .await?;

        Ok(ids.len() as u64)
    }

    async fn project_result_ids(&self, project_id: i32, source_ids: &[i64]) -> Result<Vec<i32>> {
        SearchResultEntity::find()
            .select_only()
            .column(SearchResultColumn::Id)
            .inner_join(QueryEntity)
            .filter(QueryColumn::ProjectId.eq(project_id))
            .filter(SearchResultColumn::SourceId.is_in(source_ids.iter().copied()))
            .into_tuple()
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // RAG history
    // ========================================================================

    pub async fn create_rag_query(
        &self,
        project_id: Option<i32>,
        initial_query: &str,
        expanded_queries: &[String],
    ) -> Result<RagQuery> {
        let row = RagQueryActiveModel {
            project_id: Set(project_id),
            initial_query: Set(initial_query.to_string()),
            expanded_queries: Set(Some(serde_json::json!(expanded_queries))),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        };

        row.insert(&self.conn).await.map_err(Into::into)
    }

    pub async fn create_rag_summary(
        &self,
        project_id: Option<i32>,
        document_ids: &[String],
        summary: &str,
    ) -> Result<RagSummary> {
        let row = RagSummaryActiveModel {
            project_id: Set(project_id),
            document_ids: Set(serde_json::json!(document_ids)),
            summary: Set(summary.to_string()),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        };

        row.insert(&self.conn).await.map_err(Into::into)
    }

    pub async fn create_rag_chat(
        &self,
        project_id: i32,
        document_id: i64,
        question: &str,
        answer: Option<&str>,
    ) -> Result<RagChat> {
        let row = RagChatActiveModel {
            project_id: Set(project_id),
            document_id: Set(document_id),
            question: Set(question.to_string()),
            answer: Set(answer.map(str::to_string)),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        };

        row.insert(&self.conn).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(metadata: serde_json::Value) -> ScoredNode {
        ScoredNode {
            id: "n1".into(),
            text: "Aspirin reduced mortality.".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            score: 0.82,
        }
    }

    #[test]
    fn test_fold_funnel_counts_zero_fills() {
        let counts = fold_funnel_counts(vec![
            ("Identified".into(), false, 7),
            ("Identified".into(), true, 2),
            ("Included in Review".into(), false, 1),
        ]);

        assert_eq!(counts.len(), 5);
        assert_eq!(counts["Identified"], FunnelCount { archived: 2, active: 7 });
        assert_eq!(counts["Screened"], FunnelCount::default());
        assert_eq!(counts["Included in Review"].active, 1);
    }

    #[test]
    fn test_fold_funnel_counts_skips_unknown_stage() {
        let counts = fold_funnel_counts(vec![
            ("Identified".into(), false, 3),
            ("Reviewed".into(), false, 4),
            ("screened".into(), true, 1),
        ]);

        assert_eq!(counts.len(), 5);
        assert_eq!(counts["Identified"], FunnelCount { archived: 0, active: 3 });
        assert_eq!(counts["Screened"], FunnelCount { archived: 1, active: 0 });
        assert!(!counts.contains_key("Reviewed"));
    }

    #[test]
    fn test_result_from_node_metadata() {
        let n = node(json!({
            "source": "16625675",
            "title": "Aspirin trial",
            "authors": "Jane Roe, John Doe",
            "year": "2006",
            "pico_p": "adults",
            "pico_c": ""
        }));

        let result = NewResult::from_node(&n).expect("numeric source");
        assert_eq!(result.source_id, 16625675);
        assert_eq!(result.year, Some(2006));
        assert_eq!(result.title.as_deref(), Some("Aspirin trial"));
        assert_eq!(result.pico_p.as_deref(), Some("adults"));
        assert_eq!(result.pico_c, None);
        assert_eq!(result.abstract_text.as_deref(), Some("Aspirin reduced mortality."));
    }

    #[test]
    fn test_result_from_node_requires_numeric_source() {
        assert!(NewResult::from_node(&node(json!({"source": "PMC123"}))).is_none());
        assert!(NewResult::from_node(&node(json!({"title": "no source"}))).is_none());
    }
}
