//! LitFunnel API Gateway
//!
//! HTTP entry point for search, funnel bookkeeping and RAG endpoints.
//! Handles:
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;

use axum::{
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use litfunnel_common::{
    cache::SummaryCache,
    config::{AppConfig, ServerConfig},
    db::Databases,
    embeddings::create_embedder,
    llm::create_llm,
    metrics,
    retry::RetryPolicy,
    vector::IndexRegistry,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub use state::AppState;

use middleware::rate_limit::{rate_limit_middleware, RateLimit};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config);

    info!("Starting LitFunnel API Gateway v{}", litfunnel_common::VERSION);

    let prometheus = if config.observability.metrics_enabled {
        let handle = install_prometheus()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let config = Arc::new(config);

    let dbs = Databases::connect(&config).await?;
    dbs.ensure_operations_schema(config.database.recreate_operations)
        .await?;

    let embedder = create_embedder(&config.embedding, config.vector.dimension)?;
    let llm = create_llm(&config.llm)?;

    info!(base_table = %config.vector.base_table, "Loading vector indexes...");
    let indexes = IndexRegistry::load(dbs.vectors.clone(), embedder.clone(), &config.vector)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load vector indexes");
            e
        })?;

    let state = AppState {
        summary_cache: Arc::new(SummaryCache::from_config(&config.summary_cache)),
        retry: RetryPolicy::from(&config.retry),
        config: config.clone(),
        dbs,
        indexes: Arc::new(indexes),
        llm,
        embedder,
        prometheus,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_prometheus() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Search endpoints
        .route("/projects/{project_id}/simple_search", post(handlers::search::simple_search))
        .route("/projects/{project_id}/advanced_search", post(handlers::search::advanced_search))
        .route("/projects/{project_id}/semantic_search", post(handlers::search::semantic_search))

        // Funnel endpoints
        .route("/projects/{project_id}/get_status/{status}", get(handlers::status::get_status))
        .route(
            "/projects/{project_id}/documents/{document_ids}/status/{status}",
            patch(handlers::status::update_status),
        )
        .route(
            "/projects/{project_id}/document/{document_id}/archive/{is_archived}",
            patch(handlers::status::archive),
        )

        // RAG endpoints
        .route("/rag/summarize", post(handlers::rag::summarize))
        .route("/rag/expand_query", post(handlers::rag::expand_query))
        .route(
            "/projects/{project_id}/chat/document/{document_id}",
            post(handlers::rag::chat_document),
        )
        .route("/translate_terms", post(handlers::translate::translate_terms));

    let api_routes = if state.config.rate_limit.enabled {
        let rate_limit = RateLimit::from_config(&state.config.rate_limit);
        api_routes.layer(from_fn_with_state(rate_limit, rate_limit_middleware))
    } else {
        api_routes
    };

    // Health endpoints stay outside the rate limit
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .merge(api_routes)
        .layer(from_fn(middleware::request_metrics::track_requests))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// `*` allows any origin; unparsable origins are skipped
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    if config.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
