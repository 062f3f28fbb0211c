//! Query fusion: generate query variants with the LLM, retrieve for each,
//! and fuse the ranked lists

use super::{RetrievalOptions, Retriever, ScoredNode};
use crate::errors::Result;
use crate::llm::{complete_tracked, prompts, LlmClient};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// RRF constant
pub const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Highest score per node across queries
    Simple,
    /// Sum of `1 / (k + rank)` across queries
    #[default]
    ReciprocalRank,
}

#[derive(Debug, Clone)]
pub struct QueryFusion {
    /// Total queries, original included
    pub num_queries: usize,
    pub similarity_top_k: usize,
    pub mode: FusionMode,
}

impl Default for QueryFusion {
    fn default() -> Self {
        Self {
            num_queries: 4,
            similarity_top_k: 100,
            mode: FusionMode::default(),
        }
    }
}

/// Fused nodes plus the queries that produced them
#[derive(Debug, Clone)]
pub struct FusedRetrieval {
    pub queries: Vec<String>,
    pub nodes: Vec<ScoredNode>,
}

impl FusedRetrieval {
    /// Queries the LLM added to the original
    pub fn generated_queries(&self) -> &[String] {
        self.queries.get(1..).unwrap_or_default()
    }
}

/// Original query first, then up to `num_queries - 1` generated variants
pub async fn generate_queries(
    llm: &dyn LlmClient,
    query: &str,
    num_queries: usize,
) -> Result<Vec<String>> {
    let wanted = num_queries.saturating_sub(1);
    let mut queries = vec![query.to_string()];
    if wanted == 0 {
        return Ok(queries);
    }

    let prompt = prompts::query_generation(query, wanted);
    let response = complete_tracked(llm, "query_generation", &prompt).await?;
    queries.extend(parse_generated_queries(&response, wanted));

    debug!(generated = queries.len() - 1, "Generated query variants");
    Ok(queries)
}

/// Non-empty lines of the reply, at most `limit`
pub fn parse_generated_queries(response: &str, limit: usize) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

impl QueryFusion {
    pub fn new(num_queries: usize, similarity_top_k: usize, mode: FusionMode) -> Self {
        Self {
            num_queries,
            similarity_top_k,
            mode,
        }
    }

    #[instrument(skip(self, retriever, llm), fields(num_queries = self.num_queries, mode = ?self.mode))]
    pub async fn retrieve(
        &self,
        retriever: &dyn Retriever,
        llm: &dyn LlmClient,
        query: &str,
    ) -> Result<FusedRetrieval> {
        let queries = generate_queries(llm, query, self.num_queries).await?;
        let options = RetrievalOptions::top_k(self.similarity_top_k);

        let results = try_join_all(queries.iter().map(|q| retriever.retrieve(q, &options))).await?;
        let nodes = fuse(results, self.mode, self.similarity_top_k);

        Ok(FusedRetrieval { queries, nodes })
    }
}

/// Merge per-query result lists into one ranking
pub fn fuse(results: Vec<Vec<ScoredNode>>, mode: FusionMode, top_k: usize) -> Vec<ScoredNode> {
    let mut fused: HashMap<String, ScoredNode> = HashMap::new();

    match mode {
        FusionMode::Simple => {
            for node in results.into_iter().flatten() {
                match fused.get_mut(&node.id) {
                    Some(existing) if existing.score >= node.score => {}
                    Some(existing) => *existing = node,
                    None => {
                        fused.insert(node.id.clone(), node);
                    }
                }
            }
        }
        FusionMode::ReciprocalRank => {
            for mut list in results {
                list.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                for (rank, node) in list.into_iter().enumerate() {
                    let contribution = 1.0 / (RRF_K + rank as f64);
                    fused
                        .entry(node.id.clone())
                        .and_modify(|existing| existing.score += contribution)
                        .or_insert(ScoredNode {
                            score: contribution,
                            ..node
                        });
                }
            }
        }
    }

    let mut nodes: Vec<ScoredNode> = fused.into_values().collect();
    nodes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes.truncate(top_k);
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::vector::Metadata;
    use async_trait::async_trait;

    fn node(id: &str, score: f64) -> ScoredNode {
        ScoredNode {
            id: id.to_string(),
            text: format!("text {}", id),
            metadata: Metadata::new(),
            score,
        }
    }

    struct FixedRetriever;

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &str, _options: &RetrievalOptions) -> Result<Vec<ScoredNode>> {
            Ok(match query {
                "aspirin" => vec![node("a", 0.9), node("b", 0.8)],
                _ => vec![node("b", 0.95), node("c", 0.7)],
            })
        }
    }

    #[test]
    fn test_simple_fusion_keeps_max() {
        let fused = fuse(
            vec![vec![node("a", 0.9), node("b", 0.5)], vec![node("b", 0.7)]],
            FusionMode::Simple,
            10,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "a");
        assert!((fused[1].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_rrf_favours_agreement() {
        // Query 1: [A, B, C]; query 2: [B, A, D]
        let fused = fuse(
            vec![
                vec![node("a", 0.9), node("b", 0.8), node("c", 0.7)],
                vec![node("b", 0.9), node("a", 0.7), node("d", 0.6)],
            ],
            FusionMode::ReciprocalRank,
            10,
        );

        assert_eq!(fused.len(), 4);
        // A and B tie on 1/60 + 1/61 and sort by id
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[1].id, "b");
        assert!((fused[0].score - (1.0 / 60.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((fused[3].score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_fusion_truncates() {
        let fused = fuse(
            vec![vec![node("a", 0.9), node("b", 0.8), node("c", 0.7)]],
            FusionMode::Simple,
            2,
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_parse_generated_queries() {
        let parsed = parse_generated_queries("1. aspirin dose\n\n2. aspirin risk\n3. extra\n4. more", 3);
        assert_eq!(parsed, vec!["1. aspirin dose", "2. aspirin risk", "3. extra"]);
    }

    #[tokio::test]
    async fn test_generate_queries_keeps_original_first() {
        let llm = MockLlm::with_response("aspirin dosage\naspirin bleeding risk\nunused\nunused");
        let queries = generate_queries(&llm, "aspirin", 3).await.unwrap();
        assert_eq!(queries, vec!["aspirin", "aspirin dosage", "aspirin bleeding risk"]);

        let single = generate_queries(&llm, "aspirin", 1).await.unwrap();
        assert_eq!(single, vec!["aspirin"]);
    }

    #[tokio::test]
    async fn test_fused_retrieval() {
        let llm = MockLlm::with_response("aspirin in adults");
        let fusion = QueryFusion::new(2, 100, FusionMode::ReciprocalRank);
        let result = fusion.retrieve(&FixedRetriever, &llm, "aspirin").await.unwrap();

        assert_eq!(result.generated_queries(), &["aspirin in adults".to_string()]);
        assert_eq!(result.nodes.len(), 3);
        // b ranks in both lists
        assert_eq!(result.nodes[0].id, "b");
    }
}
