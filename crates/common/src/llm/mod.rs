//! LLM access for query generation, synthesis, PICO enhancement and
//! term translation

mod client;
pub mod prompts;
mod synthesizer;

pub use client::ChatCompletionClient;
pub use synthesizer::{SynthesizedResponse, Synthesizer, EMPTY_RESPONSE};

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Single-turn text completion
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// `complete` with latency and outcome recorded under `purpose`
pub async fn complete_tracked(llm: &dyn LlmClient, purpose: &str, prompt: &str) -> Result<String> {
    let start = Instant::now();
    let result = llm.complete(prompt).await;

    crate::metrics::record_llm_call(start.elapsed().as_secs_f64(), purpose, result.is_ok());
    if let Err(e) = &result {
        tracing::warn!(purpose, model = llm.model_name(), error = %e, "LLM completion failed");
    }
    result
}

/// Deterministic stand-in used when no API key is configured
pub struct MockLlm {
    response: Option<String>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self { response: None }
    }

    /// Always answer with `response`
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }

        let topic = prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("Query:"))
            .map(str::trim)
            .unwrap_or("the request");

        Ok(format!(
            "Mock response about {} [LLM API key not configured]",
            topic
        ))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create an LLM client based on configuration. A known provider without
/// an API key falls back to the mock; an unknown provider is an error.
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());

    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockLlm::new())),
        "openai" | "together" if !has_key => {
            tracing::warn!(provider = %config.provider, "No LLM API key configured, using mock");
            Ok(Arc::new(MockLlm::new()))
        }
        "openai" | "together" => Ok(Arc::new(ChatCompletionClient::new(config)?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider '{}'", other),
        }),
    }
}
