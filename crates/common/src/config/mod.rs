//! Configuration management for LitFunnel services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Datastore, operations and vector database connections
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Vector index layout
    #[serde(default)]
    pub vector: VectorConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat-completion service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// PICO token classifier configuration
    #[serde(default)]
    pub pico: PicoConfig,

    /// Fixed retry policy applied around endpoint work
    #[serde(default)]
    pub retry: RetryConfig,

    /// In-process summary cache
    #[serde(default)]
    pub summary_cache: SummaryCacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins, `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Document datastore (Document, DocumentAbstract, PICO tables...)
    #[serde(default = "default_datastore_url")]
    pub datastore_url: String,

    /// Operational store (queries, results, funnel bookkeeping)
    #[serde(default = "default_operations_url")]
    pub operations_url: String,

    /// Vector tables (falls back to the datastore)
    pub vector_url: Option<String>,

    /// Maximum number of connections per pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections per pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Log every statement
    #[serde(default)]
    pub sql_logging: bool,

    /// Drop and recreate operations tables on startup
    #[serde(default)]
    pub recreate_operations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// Base table name; fulltext and PICO indexes derive from it
    #[serde(default = "default_base_table")]
    pub base_table: String,

    /// Embedding dimension stored in the VECTOR column
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Top-k used when a retrieval does not set one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Minimum score kept by semantic search
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, tei, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for self-hosted endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// openai, together or mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// Chat-completions base URL (provider default when unset)
    pub api_base: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Character budget of the context stuffed into synthesis prompts
    #[serde(default = "default_context_chars")]
    pub max_context_chars: usize,

    /// Nodes scoring below this are dropped before synthesis
    pub synthesis_cutoff: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PicoConfig {
    /// Token classifier: http or mock
    #[serde(default = "default_pico_classifier")]
    pub classifier: String,

    /// Token classification endpoint, required by the http classifier
    pub classifier_url: Option<String>,

    /// Chat model for the enhancement pass; `llm.model` when unset
    pub enhancement_model: Option<String>,

    /// Probability below which a token is labelled O
    #[serde(default = "default_pico_threshold")]
    pub threshold: f32,

    /// Rewrite extracted terms into sentences with the LLM
    #[serde(default = "default_enabled")]
    pub enhance: bool,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryCacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_cors_origins() -> Vec<String> { vec!["*".to_string()] }
fn default_request_timeout() -> u64 { 120 }
fn default_datastore_url() -> String { "mysql://root@localhost:4000/datastore".to_string() }
fn default_operations_url() -> String { "mysql://root@localhost:4000/operations".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_base_table() -> String { "scibert_synergy".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_top_k() -> usize { 100 }
fn default_similarity_cutoff() -> f32 { 0.5 }
fn default_pico_classifier() -> String { "http".to_string() }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "allenai/scibert_scivocab_uncased".to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_temperature() -> f32 { 0.1 }
fn default_context_chars() -> usize { 12_000 }
fn default_pico_threshold() -> f32 { 0.7 }
fn default_classifier_timeout() -> u64 { 30 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_delay() -> u64 { 2000 }
fn default_cache_capacity() -> usize { 100 }
fn default_cache_ttl() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "litfunnel".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8001
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Vector tables live in the datastore unless configured otherwise
    pub fn vector_database_url(&self) -> &str {
        self.database
            .vector_url
            .as_deref()
            .unwrap_or(&self.database.datastore_url)
    }

    pub fn fulltext_table(&self) -> String {
        format!("{}_fulltext", self.vector.base_table)
    }

    pub fn pico_table(&self, key: &str) -> String {
        format!("{}_{}", self.vector.base_table, key)
    }
}

impl PicoConfig {
    /// LLM settings for the enhancement pass: `llm` with the model swapped
    /// for `enhancement_model` when one is set
    pub fn enhancement_llm(&self, llm: &LlmConfig) -> LlmConfig {
        let mut config = llm.clone();
        if let Some(model) = self.enhancement_model.as_deref().filter(|m| !m.is_empty()) {
            config.model = model.to_string();
        }
        config
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            datastore_url: default_datastore_url(),
            operations_url: default_operations_url(),
            vector_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sql_logging: false,
            recreate_operations: false,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            base_table: default_base_table(),
            dimension: default_embedding_dimension(),
            default_top_k: default_top_k(),
            similarity_cutoff: default_similarity_cutoff(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_context_chars: default_context_chars(),
            synthesis_cutoff: None,
        }
    }
}

impl Default for PicoConfig {
    fn default() -> Self {
        Self {
            classifier: default_pico_classifier(),
            classifier_url: None,
            enhancement_model: None,
            threshold: default_pico_threshold(),
            enhance: default_enabled(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

impl Default for SummaryCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.embedding.model, "allenai/scibert_scivocab_uncased");
        assert_eq!(config.vector.dimension, 768);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.summary_cache.ttl_secs, 300);
        assert!((config.pico.threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_vector_database_fallback() {
        let mut config = AppConfig::default();
        assert_eq!(config.vector_database_url(), "mysql://root@localhost:4000/datastore");

        config.database.vector_url = Some("mysql://root@tidb:4000/vectors".to_string());
        assert_eq!(config.vector_database_url(), "mysql://root@tidb:4000/vectors");
    }

    #[test]
    fn test_derived_table_names() {
        let config = AppConfig::default();
        assert_eq!(config.fulltext_table(), "scibert_synergy_fulltext");
        assert_eq!(config.pico_table("pio"), "scibert_synergy_pio");
    }

    #[test]
    fn test_sections_default_when_missing() {
        let config: AppConfig = serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.vector.base_table, "scibert_synergy");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_enhancement_model_override() {
        let mut config = AppConfig::default();
        assert_eq!(config.pico.classifier, "http");
        assert_eq!(config.pico.enhancement_llm(&config.llm).model, config.llm.model);

        config.pico.enhancement_model = Some("gpt-3.5-turbo".to_string());
        let llm = config.pico.enhancement_llm(&config.llm);
        assert_eq!(llm.model, "gpt-3.5-turbo");
        assert_eq!(llm.provider, config.llm.provider);
    }
}
