//! Embedding service abstraction
//!
//! Documents and queries are embedded with SciBERT served behind an
//! OpenAI-compatible `/v1/embeddings` endpoint (text-embeddings-inference,
//! a hosted gateway, or OpenAI itself for other models).

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Client for OpenAI-compatible embedding endpoints
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    base_url: String,
    batch_size: usize,
    max_elapsed: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            dimension,
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            max_elapsed: Duration::from_secs(config.timeout_secs * u64::from(config.max_retries.max(1))),
        })
    }

    /// Make request with exponential backoff. Client errors are not retried.
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let result = backoff::future::retry_notify(
            policy,
            || async {
                self.make_request(texts).await.map_err(|e| {
                    if is_client_rejection(&e) {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            },
            |err: AppError, wait: Duration| {
                tracing::warn!(
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "Embedding request failed, retrying"
                );
            },
        )
        .await;

        crate::metrics::record_embedding(&self.model, texts.len(), result.is_ok());
        result
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| AppError::Embedding {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding {
                message: format!("API error {}: {}", status.as_u16(), body),
            });
        }

        let mut result: EmbeddingResponse =
            response.json().await.map_err(|e| AppError::Embedding {
                message: format!("Failed to parse response: {}", e),
            })?;

        if result.data.len() != texts.len() {
            return Err(AppError::Embedding {
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    result.data.len()
                ),
            });
        }

        result.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// 4xx other than 429 will not succeed on retry
fn is_client_rejection(err: &AppError) -> bool {
    match err {
        AppError::Embedding { message } => {
            message.starts_with("API error 4") && !message.starts_with("API error 429")
        }
        _ => false,
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::Embedding {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder for tests and offline runs.
/// Equal texts always map to the same unit vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        use rand::{Rng, SeedableRng};

        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = rand::rngs::StdRng::from_seed(seed);

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return raw;
        }
        raw.into_iter().map(|v| v / norm).collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig, dimension: usize) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" | "http" | "tei" => Ok(Arc::new(HttpEmbedder::new(config, dimension)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(768);
        let a = embedder.embed("aspirin in adults").await.unwrap();
        let b = embedder.embed("aspirin in adults").await.unwrap();
        let c = embedder.embed("statins in children").await.unwrap();

        assert_eq!(a.len(), 768);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_mock_vectors_are_unit_length() {
        let embedder = MockEmbedder::new(64);
        let v = embedder.embed("text").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_batch() {
        let embedder = MockEmbedder::new(768);
        let texts = vec!["text1".to_string(), "text2".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], embedder.embed("text1").await.unwrap());
    }

    #[test]
    fn test_client_rejections_are_permanent() {
        let bad_request = AppError::Embedding { message: "API error 400: bad input".into() };
        let throttled = AppError::Embedding { message: "API error 429: slow down".into() };
        let unavailable = AppError::Embedding { message: "API error 503: busy".into() };

        assert!(is_client_rejection(&bad_request));
        assert!(!is_client_rejection(&throttled));
        assert!(!is_client_rejection(&unavailable));
    }

    #[test]
    fn test_create_embedder_by_provider() {
        let config = EmbeddingConfig {
            provider: "mock".into(),
            ..Default::default()
        };
        let embedder = create_embedder(&config, 32).unwrap();
        assert_eq!(embedder.model_name(), "mock-embedding");
        assert_eq!(embedder.dimension(), 32);

        let config = EmbeddingConfig {
            provider: "unknown".into(),
            ..Default::default()
        };
        assert!(matches!(
            create_embedder(&config, 32),
            Err(AppError::Configuration { .. })
        ));
    }
}
