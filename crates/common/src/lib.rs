//! LitFunnel Common Library
//!
//! Shared code for the gateway and the ingestion CLI including:
//! - Database models and repositories
//! - Vector index, retrieval and query fusion
//! - Embedding and LLM client abstractions
//! - PICO extraction
//! - Error types, configuration, retry and caching
//! - Metrics

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod pico;
pub mod retry;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
