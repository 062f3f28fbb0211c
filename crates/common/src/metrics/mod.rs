//! Metrics and observability utilities
//!
//! Prometheus metrics for search, synthesis, ingestion and the review
//! funnel, all under the `litfunnel_` prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all LitFunnel metrics
pub const METRICS_PREFIX: &str = "litfunnel";

/// Fully qualified metric names
pub mod names {
    pub const REQUESTS: &str = "litfunnel_requests_total";
    pub const REQUEST_DURATION: &str = "litfunnel_request_duration_seconds";
    pub const SEARCHES: &str = "litfunnel_searches_total";
    pub const SEARCH_DURATION: &str = "litfunnel_search_duration_seconds";
    pub const RETRIEVED_NODES: &str = "litfunnel_retrieved_nodes";
    pub const LLM_CALLS: &str = "litfunnel_llm_calls_total";
    pub const LLM_LATENCY: &str = "litfunnel_llm_latency_seconds";
    pub const EMBEDDING_REQUESTS: &str = "litfunnel_embedding_requests_total";
    pub const FUNNEL_UPDATES: &str = "litfunnel_funnel_updates_total";
    pub const DOCUMENTS_INGESTED: &str = "litfunnel_documents_ingested_total";
    pub const PICO_EXTRACTIONS: &str = "litfunnel_pico_extractions_total";
    pub const RETRIES: &str = "litfunnel_retries_total";
    pub const INDEX_LOAD: &str = "litfunnel_index_load_seconds";
    pub const CACHE_HITS: &str = "litfunnel_cache_hits_total";
    pub const CACHE_MISSES: &str = "litfunnel_cache_misses_total";
}

/// Request latency buckets (in seconds). Synthesis calls dominate the tail.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(names::REQUESTS, Unit::Count, "Total number of HTTP requests");
    describe_histogram!(
        names::REQUEST_DURATION,
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval
    describe_counter!(names::SEARCHES, Unit::Count, "Searches executed, by kind");
    describe_histogram!(
        names::SEARCH_DURATION,
        Unit::Seconds,
        "Search latency in seconds"
    );
    describe_histogram!(
        names::RETRIEVED_NODES,
        Unit::Count,
        "Nodes returned by a retrieval"
    );
    describe_histogram!(
        names::INDEX_LOAD,
        Unit::Seconds,
        "Time to open a vector index"
    );

    // Upstream models
    describe_counter!(names::LLM_CALLS, Unit::Count, "LLM completions, by purpose and status");
    describe_histogram!(names::LLM_LATENCY, Unit::Seconds, "LLM completion latency");
    describe_counter!(
        names::EMBEDDING_REQUESTS,
        Unit::Count,
        "Embedding API requests"
    );
    describe_counter!(
        names::PICO_EXTRACTIONS,
        Unit::Count,
        "Abstracts run through PICO extraction"
    );

    // Storage
    describe_counter!(
        names::FUNNEL_UPDATES,
        Unit::Count,
        "Result rows moved to a funnel stage"
    );
    describe_counter!(
        names::DOCUMENTS_INGESTED,
        Unit::Count,
        "Rows inserted into the datastore, by table"
    );
    describe_counter!(names::RETRIES, Unit::Count, "Retried attempts, by operation");

    describe_counter!(names::CACHE_HITS, Unit::Count, "Total cache hits");
    describe_counter!(names::CACHE_MISSES, Unit::Count, "Total cache misses");

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            names::REQUESTS,
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            names::REQUEST_DURATION,
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, kind: &str, result_count: usize) {
    counter!(names::SEARCHES, "kind" => kind.to_string()).increment(1);
    histogram!(names::SEARCH_DURATION, "kind" => kind.to_string()).record(duration_secs);
    histogram!(names::RETRIEVED_NODES, "kind" => kind.to_string()).record(result_count as f64);
}

/// Helper to record an LLM completion
pub fn record_llm_call(duration_secs: f64, purpose: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        names::LLM_CALLS,
        "purpose" => purpose.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(names::LLM_LATENCY, "purpose" => purpose.to_string()).record(duration_secs);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        names::EMBEDDING_REQUESTS,
        "model" => model.to_string(),
        "status" => status,
        "batch" => if batch_size > 1 { "batch" } else { "single" }
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit { names::CACHE_HITS } else { names::CACHE_MISSES };
    counter!(name, "cache" => cache_name.to_string()).increment(1);
}

/// Helper to record a retried attempt
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES, "operation" => operation.to_string()).increment(1);
}
