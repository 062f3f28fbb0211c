//! Compact response synthesis: stuff retrieved node texts into a single
//! context prompt and ask the LLM once

use super::{complete_tracked, prompts, LlmClient};
use crate::errors::Result;
use crate::vector::{filter_by_similarity, ScoredNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Response when no context survives filtering
pub const EMPTY_RESPONSE: &str = "Empty Response";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResponse {
    pub response: String,
    pub source_nodes: Vec<ScoredNode>,
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    max_context_chars: usize,
    similarity_cutoff: Option<f64>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
            similarity_cutoff: None,
        }
    }

    /// Drop nodes scoring below `cutoff` before synthesis
    pub fn with_similarity_cutoff(mut self, cutoff: f64) -> Self {
        self.similarity_cutoff = Some(cutoff);
        self
    }

    #[instrument(skip(self, query, nodes), fields(nodes = nodes.len()))]
    pub async fn synthesize(&self, query: &str, nodes: Vec<ScoredNode>) -> Result<SynthesizedResponse> {
        let nodes = match self.similarity_cutoff {
            Some(cutoff) => filter_by_similarity(nodes, cutoff),
            None => nodes,
        };

        if nodes.is_empty() {
            return Ok(SynthesizedResponse {
                response: EMPTY_RESPONSE.to_string(),
                source_nodes: nodes,
            });
        }

        let context = build_context(&nodes, self.max_context_chars);
        debug!(context_chars = context.len(), "Synthesizing response");

        let prompt = prompts::context_qa(&context, query);
        let response = complete_tracked(self.llm.as_ref(), "synthesis", &prompt).await?;

        Ok(SynthesizedResponse {
            response: response.trim().to_string(),
            source_nodes: nodes,
        })
    }
}

/// Node texts separated by blank lines, cut at `max_chars` on a char boundary
pub fn build_context(nodes: &[ScoredNode], max_chars: usize) -> String {
    let mut context = String::new();

    for node in nodes {
        let text = node.text.trim();
        if text.is_empty() {
            continue;
        }
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(text);
        if context.len() >= max_chars {
            break;
        }
    }

    if context.len() > max_chars {
        let mut cut = max_chars;
        while !context.is_char_boundary(cut) {
            cut -= 1;
        }
        context.truncate(cut);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::vector::Metadata;

    fn node(text: &str, score: f64) -> ScoredNode {
        ScoredNode {
            id: text.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            score,
        }
    }

    #[test]
    fn test_build_context_joins_and_truncates() {
        let nodes = vec![node("first", 0.9), node("", 0.8), node("second", 0.7)];
        assert_eq!(build_context(&nodes, 1000), "first\n\nsecond");
        assert_eq!(build_context(&nodes, 8), "first\n\ns");
    }

    #[test]
    fn test_build_context_respects_char_boundaries() {
        let nodes = vec![node("ééé", 0.9)];
        assert_eq!(build_context(&nodes, 3), "é");
    }

    #[tokio::test]
    async fn test_empty_nodes_give_empty_response() {
        let synth = Synthesizer::new(Arc::new(MockLlm::with_response("unused")), 100);
        let out = synth.synthesize("q", vec![]).await.unwrap();
        assert_eq!(out.response, EMPTY_RESPONSE);
    }

    #[tokio::test]
    async fn test_cutoff_applies_before_synthesis() {
        let synth = Synthesizer::new(Arc::new(MockLlm::with_response("answer ")), 100)
            .with_similarity_cutoff(0.5);

        let out = synth.synthesize("q", vec![node("low", 0.2)]).await.unwrap();
        assert_eq!(out.response, EMPTY_RESPONSE);

        let out = synth
            .synthesize("q", vec![node("high", 0.8), node("low", 0.2)])
            .await
            .unwrap();
        assert_eq!(out.response, "answer");
        assert_eq!(out.source_nodes.len(), 1);
    }
}
